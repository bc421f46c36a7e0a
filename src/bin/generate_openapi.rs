//! Dumps the sensor telemetry OpenAPI document so clients can be generated
//! without starting the server or touching a database.
//!
//!   generate_openapi                     pretty JSON on stdout
//!   generate_openapi --output api.json   write to a file, creating parent dirs
//!   generate_openapi --compact           single-line JSON

use std::{fs, io::Write, path::PathBuf};

use anyhow::{bail, Context, Result};
use sensor_telemetry_service::api::handlers::ApiDoc;
use utoipa::OpenApi;

#[derive(Debug, Default, PartialEq)]
struct Args {
    output: Option<PathBuf>,
    compact: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--output" | "-o" => {
                let path = args.next().context("--output needs a path")?;
                parsed.output = Some(PathBuf::from(path));
            }
            "--compact" => parsed.compact = true,
            other => bail!("unexpected argument: {other}"),
        }
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let doc = ApiDoc::openapi();
    let json = if args.compact {
        doc.to_json()
    } else {
        doc.to_pretty_json()
    }
    .context("serialising OpenAPI document")?;

    match args.output {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} paths written to {}", doc.paths.paths.len(), path.display());
        }
        None => std::io::stdout()
            .write_all(json.as_bytes())
            .context("writing to stdout")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_to_pretty_stdout() {
        assert_eq!(parse(&[]).unwrap(), Args::default());
    }

    #[test]
    fn reads_output_and_compact() {
        let args = parse(&["--compact", "-o", "out/api.json"]).unwrap();
        assert!(args.compact);
        assert_eq!(args.output, Some(PathBuf::from("out/api.json")));
    }

    #[test]
    fn rejects_dangling_or_unknown_flags() {
        assert!(parse(&["--output"]).is_err());
        assert!(parse(&["--yaml"]).is_err());
    }
}
