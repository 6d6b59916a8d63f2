#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::config::{CliOverrides, Config};
    use crate::output::OutputFormat;

    proptest! {
        #[test]
        fn prop_output_format_display_parses_back(
            format in prop_oneof![
                Just(OutputFormat::Table),
                Just(OutputFormat::Json),
                Just(OutputFormat::Quiet),
            ]
        ) {
            prop_assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
            prop_assert_eq!(format.to_string().to_uppercase().parse::<OutputFormat>().unwrap(), format);
        }

        #[test]
        fn prop_overrides_win_over_file(cluster in "[a-z]{1,12}", url in "https://[a-z]{1,10}\\.example/ul/v1") {
            let overrides = CliOverrides {
                cluster: Some(cluster.clone()),
                wallet_url: Some(url.clone()),
                ..Default::default()
            };
            let config = Config::default().with_overrides(&overrides);
            prop_assert_eq!(&config.wallet.cluster, &cluster);
            prop_assert_eq!(&config.wallet.wallet_base_url, &url);
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_unknown_log_levels_rejected(level in "[a-z]{6,10}") {
            prop_assume!(!["error", "warn", "info", "debug", "trace"].contains(&level.as_str()));
            let mut config = Config::default();
            config.logging.level = level;
            prop_assert!(config.validate().is_err());
        }
    }
}
