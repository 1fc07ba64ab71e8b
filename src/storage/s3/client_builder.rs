use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;

use crate::config::ClientConfig;
use crate::types::S3Credentials;

const DEFAULT_REGION: &str = "us-east-1";
const STATIC_CREDENTIALS_PROVIDER_NAME: &str = "moveobject-rs";

impl ClientConfig {
    pub async fn create_client(&self) -> Client {
        let sdk_config = self.load_sdk_config().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.force_path_style)
            .build();

        Client::from_conf(s3_config)
    }

    async fn load_sdk_config(&self) -> aws_config::SdkConfig {
        let region_provider = RegionProviderChain::first_try(self.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let mut config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(self.build_retry_config())
            .timeout_config(self.build_timeout_config());

        config_loader = self.load_credential(config_loader);

        if let Some(endpoint_url) = &self.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint_url);
        }

        config_loader.load().await
    }

    fn load_credential(&self, config_loader: ConfigLoader) -> ConfigLoader {
        match &self.credential {
            S3Credentials::Credentials { access_keys } => {
                let credentials = Credentials::new(
                    access_keys.access_key.to_string(),
                    access_keys.secret_access_key.to_string(),
                    access_keys.session_token.clone(),
                    None,
                    STATIC_CREDENTIALS_PROVIDER_NAME,
                );
                config_loader.credentials_provider(credentials)
            }
            S3Credentials::Profile(profile_name) => config_loader.profile_name(profile_name),
            S3Credentials::FromEnvironment => config_loader,
        }
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ))
    }

    fn build_timeout_config(&self) -> TimeoutConfig {
        let to_duration = |milliseconds: Option<u64>| milliseconds.map(Duration::from_millis);

        let mut builder = TimeoutConfig::builder();
        builder
            .set_operation_timeout(to_duration(
                self.cli_timeout_config.operation_timeout_milliseconds,
            ))
            .set_operation_attempt_timeout(to_duration(
                self.cli_timeout_config.operation_attempt_timeout_milliseconds,
            ))
            .set_connect_timeout(to_duration(
                self.cli_timeout_config.connect_timeout_milliseconds,
            ))
            .set_read_timeout(to_duration(self.cli_timeout_config.read_timeout_milliseconds));
        builder.build()
    }
}
