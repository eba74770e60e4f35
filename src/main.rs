use anyhow::{Result, bail};
use ivd_config::IvdConfig;
use ivd_core::{Environment, LoadStatus};

fn init_logging(config: &IvdConfig) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &config.diagnostics.log_filter {
        builder.parse_filters(filter);
    }
    let _ = builder.try_init();
}

fn main() -> Result<()> {
    let config = IvdConfig::load();
    init_logging(&config);

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: ivd <document.ivd.json>");
    };

    let mut env = Environment::with_config(config);
    match env.load_file(&path) {
        LoadStatus::Success => log::info!("loaded {path}"),
        LoadStatus::FileNotFound => bail!("{path}: no such document"),
        LoadStatus::CompileError => bail!("{path} failed to compile:\n{}", env.compiler_errors()),
    }

    env.run();

    for (item, window) in env.driver().windows() {
        log::info!(
            "window {item} \"{}\" {}: {} draw commands",
            window.title,
            window.size(),
            window.canvas.commands().len()
        );
    }
    log::info!("stopped after {} frames", env.frames());
    Ok(())
}
