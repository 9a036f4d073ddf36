use crate::config::RemoteConfig;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, RequestChecksumCalculation};
use aws_sdk_s3::Client;

/// Create an S3 client for the configured bucket (R2, AWS or any S3-compatible endpoint)
pub fn create_s3_client(config: &RemoteConfig) -> Client {
    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        None,
        None,
        "cv-vault-provider",
    );

    let mut builder = S3ConfigBuilder::new()
        .credentials_provider(credentials)
        .region(Region::new(config.region.clone()))
        // Presigned PUTs are sent by reqwest, which does not add SDK checksums
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);

    if let Some(endpoint_url) = config.endpoint_url() {
        builder = builder.endpoint_url(endpoint_url).force_path_style(true);
    }

    Client::from_conf(builder.build())
}
