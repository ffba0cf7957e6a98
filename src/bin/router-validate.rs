use segment_router::config::Config;
use segment_router::pattern::{split_path, MatchKind, Segment};
use segment_router::tree::{EndpointGroup, MethodKey};
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: router-validate <config-file> [route-template ...]");
        eprintln!("\nExample:");
        eprintln!("  router-validate config.yaml '/users/${{id=\"\\d+\"}}' '/files/*'");
        process::exit(1);
    }

    let config_path = &args[1];
    let templates = &args[2..];

    println!("Validating configuration file: {}", config_path);
    println!("{}", "=".repeat(60));

    let config = match Config::from_yaml_file(config_path).and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Configuration is invalid!\n");
            eprintln!("Error: {}", e);

            if e.to_string().contains("YAML") || e.to_string().contains("parsing") {
                eprintln!("\nHint: Check for YAML syntax errors:");
                eprintln!("  - Proper indentation (use spaces, not tabs)");
                eprintln!("  - Missing colons or dashes");
                eprintln!("  - Unclosed quotes");
            }

            eprintln!("\n{}", "=".repeat(60));
            process::exit(1);
        }
    };

    println!("✓ Configuration is valid!\n");
    println!("Summary:");
    println!("  - Listen address: {}", config.server.bind_addr());
    println!("  - Default status: {}", config.server.default_status_code);
    if config.server.max_content_length == 0 {
        println!("  - Max content length: unbounded");
    } else {
        println!("  - Max content length: {} bytes", config.server.max_content_length);
    }
    println!(
        "  - Base response headers: {}",
        config.server.base_response_headers.len()
    );
    println!("  - Storage location: {}", config.storage.location.display());
    println!(
        "  - Rate limit guard: {}",
        if config.server.rate_limit.is_some() { "configured" } else { "off" }
    );
    println!(
        "  - API key guard: {}",
        if config.server.api_keys.is_some() { "configured" } else { "off" }
    );

    if templates.is_empty() {
        println!("\n{}", "=".repeat(60));
        println!("Configuration validation complete!");
        return;
    }

    println!("\nRoute templates:");
    let mut tree: EndpointGroup<()> = EndpointGroup::root();
    let mut failures = 0;

    for template in templates {
        match describe(template) {
            Ok(description) => match tree.insert(template, MethodKey::Any, ()) {
                Ok(()) => println!("  ✓ {} [{}]", template, description),
                Err(e) => {
                    failures += 1;
                    println!("  ✗ {}: {}", template, e);
                }
            },
            Err(e) => {
                failures += 1;
                println!("  ✗ {}: {}", template, e);
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    if failures > 0 {
        eprintln!("{} of {} route templates are invalid", failures, templates.len());
        process::exit(1);
    }
    println!("Configuration validation complete!");
}

/// One word per segment, e.g. `literal, capture(id), wildcard`.
fn describe(template: &str) -> Result<String, segment_router::ConfigError> {
    let mut parts = Vec::new();
    for raw in split_path(template) {
        let segment = Segment::compile(raw)?;
        parts.push(match segment.kind() {
            MatchKind::Literal => "literal".to_string(),
            MatchKind::Capture => format!("capture({})", segment.capture_names().join(", ")),
            MatchKind::Wildcard => "wildcard".to_string(),
        });
    }

    if parts.is_empty() {
        return Ok("root".to_string());
    }
    Ok(parts.join(", "))
}
