use anyhow::Context;
use base64::Engine;
use rootjail::config::Config;
use rootjail::{logging, FileImporter, ImportError};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

const USAGE: &str = "usage: rootjail [--config FILE] [--root DIR] [-J DIR]... [--from FILE] [--json] [--trace] PATH";

struct Args {
    config_path: PathBuf,
    root: Option<PathBuf>,
    jpaths: Vec<String>,
    from: String,
    json: bool,
    trace: bool,
    path: String,
}

/// `Err` carries the message printed above the usage line.
fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        config_path: PathBuf::from("rootjail.toml"),
        root: None,
        jpaths: Vec::new(),
        from: String::new(),
        json: false,
        trace: false,
        path: String::new(),
    };
    let mut i = 1;
    let value = |i: usize, flag: &str| -> Result<String, String> {
        args.get(i).cloned().ok_or_else(|| format!("{flag} requires a value"))
    };
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                parsed.config_path = PathBuf::from(value(i, "--config")?);
            }
            "--root" => {
                i += 1;
                parsed.root = Some(PathBuf::from(value(i, "--root")?));
            }
            "-J" | "--jpath" => {
                i += 1;
                parsed.jpaths.push(value(i, "-J")?);
            }
            "--from" => {
                i += 1;
                parsed.from = value(i, "--from")?;
            }
            "--json" => parsed.json = true,
            "--trace" => parsed.trace = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => return Err(format!("unknown flag: {flag}")),
            extra if !parsed.path.is_empty() => return Err(format!("unexpected argument: {extra}")),
            path => parsed.path = path.to_string(),
        }
        i += 1;
    }
    if parsed.path.is_empty() {
        return Err("missing PATH".to_string());
    }
    Ok(parsed)
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut cfg = if args.config_path.exists() {
        Config::load(&args.config_path).context("loading config")?
    } else {
        let root = args
            .root
            .clone()
            .with_context(|| format!("no config at {} and no --root given", args.config_path.display()))?;
        Config::for_root(root)
    };
    if let Some(root) = &args.root {
        cfg.root.root_dir = root.clone();
    }
    cfg.library.jpaths.extend(args.jpaths.iter().cloned());
    cfg.validate().context("validating config")?;
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv).unwrap_or_else(|msg| {
        eprintln!("{msg}\n{USAGE}");
        std::process::exit(2);
    });
    let cfg = load_config(&args)?;

    let mut options = cfg.options();
    if args.trace {
        options = options.logger(logging::importer_dispatch("debug"));
    }
    let importer = cfg.build_importer(options)?;
    info!(root = %importer.root().display(), jpaths = ?importer.library_paths(), "rootjail ready");

    let outcome = run(&importer, &args);
    importer.close().context("closing importer")?;
    outcome
}

fn run(importer: &dyn FileImporter, args: &Args) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    match importer.resolve(&args.from, &args.path) {
        Ok(found) if args.json => {
            let body = json!({
                "found_at": found.found_at.display().to_string(),
                "content_b64": base64::engine::general_purpose::STANDARD.encode(&found.content),
                "encoding": "base64",
                "bytes": found.content.len(),
            });
            writeln!(stdout, "{body}")?;
            Ok(())
        }
        Ok(found) => {
            stdout.write_all(&found.content)?;
            Ok(())
        }
        Err(err) if args.json => {
            writeln!(stdout, "{}", json!({ "error": err.body() }))?;
            Err(fail(err, args))
        }
        Err(err) => Err(fail(err, args)),
    }
}

fn fail(err: ImportError, args: &Args) -> anyhow::Error {
    anyhow::Error::new(err).context(format!("resolving {:?} from {:?}", args.path, args.from))
}

#[cfg(test)]
mod tests {
    use super::parse_args;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("rootjail").chain(args.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn flags_and_path() {
        let args = parse_args(&argv(&["--root", "/srv", "-J", "lib", "--jpath", "vendor", "--json", "main.jsonnet"]))
            .unwrap();
        assert_eq!(args.root.as_deref(), Some(std::path::Path::new("/srv")));
        assert_eq!(args.jpaths, ["lib", "vendor"]);
        assert!(args.json);
        assert!(!args.trace);
        assert_eq!(args.path, "main.jsonnet");
    }

    #[test]
    fn unknown_flag_rejected() {
        let err = parse_args(&argv(&["--roto", "/srv", "main.jsonnet"])).err().unwrap();
        assert_eq!(err, "unknown flag: --roto");
        let err = parse_args(&argv(&["main.jsonnet", "-x"])).err().unwrap();
        assert_eq!(err, "unknown flag: -x");
    }

    #[test]
    fn second_path_rejected() {
        let err = parse_args(&argv(&["a.jsonnet", "b.jsonnet"])).err().unwrap();
        assert_eq!(err, "unexpected argument: b.jsonnet");
    }

    #[test]
    fn missing_values_and_path() {
        assert_eq!(parse_args(&argv(&["--from"])).err().unwrap(), "--from requires a value");
        assert_eq!(parse_args(&argv(&["--json"])).err().unwrap(), "missing PATH");
    }
}
