//! Configuration read from environment variables.

/// Interpret a string value such as "1" or "no" as a boolean.
pub fn str_as_bool(s: &str) -> bool {
    match s {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => {
            eprintln!("Unrecognized boolean value \"{}\"", s);
            false
        }
    }
}

/// Return whether a feature flag controlled by an environment variable is
/// enabled.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .as_ref()
        .map(|s| str_as_bool(s))
        .unwrap_or(default)
}

/// Return whether verbose logging was requested with `OML_VERBOSE`.
pub fn verbose_from_env() -> bool {
    env_flag("OML_VERBOSE", false)
}

/// Parse a zlib compression level in the range 0-9.
pub fn parse_compression_level(s: &str) -> Option<u32> {
    s.trim().parse::<u32>().ok().filter(|level| *level <= 9)
}

/// Return the compression level set with `OML_COMPRESSION_LEVEL`, if any.
pub fn compression_level_from_env() -> Option<u32> {
    let value = std::env::var("OML_COMPRESSION_LEVEL").ok()?;
    let level = parse_compression_level(&value);
    if level.is_none() {
        eprintln!("Unrecognized compression level \"{}\"", value);
    }
    level
}
