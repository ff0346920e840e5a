use tracing_subscriber::EnvFilter;

use crate::network::AccurateFnParams;

mod neural_network;

/// Route `tracing` output to the test harness; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn binary_accurate(params: AccurateFnParams<'_>) -> bool {
    assert_eq!(params.outputs.len(), 1);
    let eval = params.outputs[0];
    let Some(label) = params.inputs.last() else {
        return false;
    };
    (eval - label).abs() < 0.5
}
