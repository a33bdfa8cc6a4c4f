use envconfig::Envconfig;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: String,

    #[envconfig(from = "DATABASE_URL")]
    pub database_url: String,

    /// Comma separated Telegram user ids that are registered as admins.
    #[envconfig(from = "ADMIN_IDS", default = "")]
    pub admin_ids: String,

    /// Delivered orders after which a free-plan seller is suspended.
    #[envconfig(from = "SUSPENSION_THRESHOLD", default = "10")]
    pub suspension_threshold: i32,

    #[envconfig(from = "FREE_PLAN_UPLOAD_LIMIT", default = "5")]
    pub free_plan_upload_limit: i32,

    /// Cron expression (with seconds) for the notification dispatcher.
    #[envconfig(from = "NOTIFICATION_SCHEDULE", default = "*/30 * * * * *")]
    pub notification_schedule: String,
}

/// Marketplace rules shared with every handler.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub admin_ids: Vec<i64>,
    pub suspension_threshold: i32,
    pub free_plan_upload_limit: i32,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let admin_ids = parse_admin_ids(&config.admin_ids);
        Settings {
            admin_ids,
            suspension_threshold: config.suspension_threshold,
            free_plan_upload_limit: config.free_plan_upload_limit,
        }
    }

    pub fn is_bootstrap_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            admin_ids: Vec::new(),
            suspension_threshold: 10,
            free_plan_upload_limit: 5,
        }
    }
}

fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                log::warn!("Ignoring invalid admin id in ADMIN_IDS: {}", s);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn admin_ids_skip_blanks_and_garbage() {
        assert_eq!(parse_admin_ids("12, 34,,x, 56 "), vec![12, 34, 56]);
        assert!(parse_admin_ids("").is_empty());
    }

    #[test]
    fn config_falls_back_to_defaults() {
        let env = HashMap::from([
            ("TELEGRAM_BOT_TOKEN".to_string(), "token".to_string()),
            ("DATABASE_URL".to_string(), "postgres://localhost/chefsbd".to_string()),
            ("ADMIN_IDS".to_string(), "42".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();
        let settings = Settings::from_config(&config);

        assert_eq!(config.notification_schedule, "*/30 * * * * *");
        assert_eq!(settings.suspension_threshold, 10);
        assert_eq!(settings.free_plan_upload_limit, 5);
        assert!(settings.is_bootstrap_admin(42));
        assert!(!settings.is_bootstrap_admin(7));
    }
}
