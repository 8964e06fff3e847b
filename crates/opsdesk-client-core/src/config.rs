use secrecy::SecretString;

/// Connection settings for the hosted backend
#[derive(serde::Deserialize, Clone, Debug)]
pub struct RestConfig {
    /// Eg. `https://myproject.example-baas.co`
    pub base_url: String,
    /// Publishable key sent with every request; row-level security does the
    /// real enforcement server side
    pub anon_key: SecretString,
    /// Refresh token saved from a previous run, lets the client resume the
    /// session at boot
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
}

pub fn get_configuration() -> Result<RestConfig, config::ConfigError> {
    let base_path = std::env::current_dir().expect("failed to determine the current directory");

    let settings = config::Config::builder()
        .add_source(config::File::from(base_path.join("opsdesk.toml")).required(false))
        // E.g. `OPSDESK_BASE_URL=... would set `RestConfig.base_url`
        .add_source(
            config::Environment::with_prefix("OPSDESK")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<RestConfig>()
}
