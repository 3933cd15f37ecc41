use std::env::var;

use dotenvy::dotenv;

pub struct Config {
    pub database_url: String,
    pub whatsapp_api_token: String,
    pub whatsapp_phone_number_id: String,
    pub dispatch_batch_size: u32,
    pub dispatch_interval_secs: u64,
}

impl Config {
    pub fn try_parse() -> Result<Config, &'static str> {
        let _ = dotenv();

        Ok(Config {
            database_url: var("DATABASE_URL")
                .map_err(|_| "An error occured while getting DATABASE_URL env param")?,
            whatsapp_api_token: var("WHATSAPP_API_TOKEN")
                .map_err(|_| "An error occured while getting WHATSAPP_API_TOKEN env param")?,
            whatsapp_phone_number_id: var("WHATSAPP_PHONE_NUMBER_ID")
                .map_err(|_| "An error occured while getting WHATSAPP_PHONE_NUMBER_ID env param")?,
            dispatch_batch_size: match var("DISPATCH_BATCH_SIZE") {
                Ok(raw) => raw
                    .parse::<u32>()
                    .map_err(|_| "An error occured while parsing DISPATCH_BATCH_SIZE env param")?,
                Err(_) => 100,
            },
            dispatch_interval_secs: match var("DISPATCH_INTERVAL_SECS") {
                Ok(raw) => raw
                    .parse::<u64>()
                    .map_err(|_| "An error occured while parsing DISPATCH_INTERVAL_SECS env param")?,
                Err(_) => 30,
            },
        })
    }
}
