use regex::Regex;
use std::env;
use std::sync::OnceLock;

static ENV_REGEX: OnceLock<Regex> = OnceLock::new();

fn env_regex() -> &'static Regex {
    ENV_REGEX.get_or_init(|| {
        Regex::new(r"\$\{env:([^:}]+)(?::([^}]*))?\}").expect("Failed to compile env regex")
    })
}

/// Replace `${env:VAR}` and `${env:VAR:default}` with the variable's value.
/// Placeholders with no value and no default are left as written.
pub fn interpolate_env_vars(input: &str) -> String {
    env_regex()
        .replace_all(input, |caps: &regex::Captures| {
            match (env::var(&caps[1]), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => caps[0].to_string(),
            }
        })
        .into_owned()
}
