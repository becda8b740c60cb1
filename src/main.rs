use std::path::PathBuf;

fn main() {
    let mut options = echobreak::RunOptions::default();
    if handle_cli_flags(&mut options) {
        return;
    }

    if let Err(err) = echobreak::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags(options: &mut echobreak::RunOptions) -> bool {
    let mut saw_flag = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("EchoBreak {}", echobreak::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "EchoBreak — Annotate a social news feed with bias labels.\n\nUsage: echobreak [URL] [options]\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --watch              Keep polling the page and rescanning\n  --out FILE           Write the annotated page to FILE instead of stdout\n  --config FILE        Read configuration from FILE\n  --dashboard          Find the local dashboard and open it"
                );
                saw_flag = true;
            }
            "--dashboard" => {
                saw_flag = true;
                if let Err(err) = open_dashboard_once(options.config_file.clone()) {
                    eprintln!("Dashboard lookup failed: {err:?}");
                    std::process::exit(1);
                }
            }
            "--watch" => options.watch = true,
            "--out" => options.output = args.next().map(PathBuf::from),
            "--config" => options.config_file = args.next().map(PathBuf::from),
            other if !other.starts_with('-') => options.url = Some(other.to_string()),
            _ => {}
        }
    }
    saw_flag
}

fn open_dashboard_once(config_file: Option<PathBuf>) -> anyhow::Result<()> {
    let cfg = echobreak::config::load(echobreak::config::LoadOptions {
        config_file,
        env_prefix: None,
    })?;

    match echobreak::dashboard::discover(cfg.dashboard.port_start, cfg.dashboard.port_count) {
        Some(port) => {
            println!("Dashboard found on port {port}");
            echobreak::dashboard::open(port)
        }
        None => {
            let end = cfg.dashboard.port_start + cfg.dashboard.port_count - 1;
            println!(
                "No dashboard responding on ports {} to {}.",
                cfg.dashboard.port_start, end
            );
            Ok(())
        }
    }
}
