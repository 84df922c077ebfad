use dragon_conf::config::file_or_bundled;
use dragon_conf::{BundledSourceProvider, ConfigDuration, ConfigFactory, Overrides};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AppConfig {
    app: AppSection,
    database: DatabaseSection,
}

#[derive(Debug, Deserialize)]
struct AppSection {
    name: String,
    debug: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct DatabaseSection {
    host: String,
    port: u16,
    name: String,
    url: String,
    password: String,
    max_wait: ConfigDuration,
}

fn main() -> Result<(), dragon_conf::ConfigError> {
    // demos/app.yml from the working directory, or the copy built into the binary
    let provider = file_or_bundled(
        BundledSourceProvider::new().with_document("demos/app.yml", include_str!("app.yml")),
    );

    // env=dev unless the process environment says otherwise
    let mut overrides = Overrides::from_process();
    if overrides.get("env").is_none() {
        overrides.insert("env", "dev");
    }

    let config: AppConfig = ConfigFactory::builder()
        .with_override_keys("DEMO", "__")
        .build(&provider, "demos/app.yml", &overrides)?;

    println!("App: {} (debug={})", config.app.name, config.app.debug);
    println!("Database URL: {}", config.database.url);
    println!("Max wait: {}", config.database.max_wait);

    Ok(())
}
