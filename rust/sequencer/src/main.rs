use std::error::Error;

use tracing::{error, info};

use xane_sequencer::{format_felt, telemetry, Sequencer, SequencerConfig};

fn main() {
    let config_path = SequencerConfig::path_from_env();
    let config = match SequencerConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    telemetry::init(&config.log_filter);

    if let Err(err) = run(config) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(config: SequencerConfig) -> Result<(), Box<dyn Error>> {
    let sequencer = Sequencer::open(&config)?;
    let state = sequencer.state()?;
    info!(
        snapshot = %sequencer.snapshot_path().display(),
        balances_root = %format_felt(&state.balances_root),
        pools_root = %format_felt(&state.pools_root),
        liquidities_root = %format_felt(&state.liquidities_root),
        commitment = %format_felt(&state.commitment()),
        "sequencer ready"
    );
    sequencer.save()?;
    Ok(())
}
