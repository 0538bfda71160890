use std::path::PathBuf;

fn main() {
    let options = match handle_cli_flags() {
        Some(options) => options,
        None => return,
    };

    if let Err(err) = pokedex_tui::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> Option<pokedex_tui::RunOptions> {
    let mut options = pokedex_tui::RunOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Pokedex-TUI {}", pokedex_tui::VERSION);
                return None;
            }
            "--help" | "-h" => {
                let config_path = pokedex_tui::config::default_path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "(no config directory)".to_string());
                println!(
                    "Pokedex-TUI — Roll a random creature from the catalog.\n\n  --config <path>      Read settings from this YAML file\n                       (default: {config_path})\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\nKeys: Enter/Space/l roll · Esc/a abort · q quit"
                );
                return None;
            }
            "--config" => match args.next() {
                Some(path) => options.config_file = Some(PathBuf::from(path)),
                None => {
                    eprintln!("error: --config needs a path");
                    std::process::exit(2);
                }
            },
            other => {
                eprintln!("error: unknown argument {other:?} (see --help)");
                std::process::exit(2);
            }
        }
    }
    Some(options)
}
