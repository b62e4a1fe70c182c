/// settings json - load platform settings, update them by name, inspect errors
use teller_market::{Decimal, MarketError, PlatformSettings, SettingName};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== platform settings ===\n");

    let defaults = PlatformSettings::default();
    let json = defaults.to_json_pretty();
    println!("defaults:\n{}\n", json);

    let mut settings = PlatformSettings::from_json(&json)?;

    // rates are set in basis points, windows in seconds
    settings.set(SettingName::RequiredSubmissionsPercentage, Decimal::from(6_000))?;
    settings.set(SettingName::ResponseExpiryWindow, Decimal::from(600))?;
    println!(
        "required submissions: {} ({} bps)",
        settings.required_submissions_percentage,
        settings.get(SettingName::RequiredSubmissionsPercentage)
    );
    println!("response expiry window: {}s", settings.get(SettingName::ResponseExpiryWindow));

    // out-of-range updates are refused and leave the settings as they were
    let err = settings
        .set(SettingName::MaximumTolerance, Decimal::from(20_000))
        .err();
    if let Some(e) = err {
        print_error(&e);
    }

    match PlatformSettings::from_json("{\"chain_id\": 1}") {
        Ok(_) => println!("partial settings unexpectedly accepted"),
        Err(e) => print_error(&e),
    }

    Ok(())
}

fn print_error(e: &MarketError) {
    println!("rejected ({:?}, retryable: {}): {}", e.kind(), e.is_retryable(), e);
}
