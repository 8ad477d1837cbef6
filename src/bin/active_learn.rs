/// Active learning runner: train, evaluate and label for a fixed number of rounds
///
/// Usage: `active-learn [config.json]`. Without a config file the defaults
/// are used (uncertainty sampling over `./datasets`).
use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;

use active_learning::data::{ArrayDataset, Dataset};
use active_learning::models::{MlpClassifier, MlpConfig};
use active_learning::training::{ClassifierTrainer, JsonLinesSink, LogSink, MultiSink, TrainingConfig};
use active_learning::{strategy, ActiveLearningConfig, RoundController};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from: {}", path);
            let file = std::fs::File::open(&path)?;
            serde_json::from_reader::<_, ActiveLearningConfig>(file)?
        }
        None => ActiveLearningConfig::default(),
    };
    config.validate()?;

    log::info!("=== Active learning: {} ===", config.run_name());
    log::info!("Configuration: {:#?}", config);

    // Device setup - Try CUDA first, fallback to CPU
    let device = if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)?
    } else {
        Device::Cpu
    };
    log::info!("Using device: {:?}", device);

    log::info!("Loading dataset from: {}", config.data_dir.display());
    let dataset = ArrayDataset::from_directory(&config.data_dir)?;
    log::info!("Dataset loaded:");
    log::info!("  - Total examples: {}", dataset.len());
    log::info!("  - Feature dim: {}", dataset.feature_dim());
    log::info!("  - Classes: {}", dataset.num_classes());
    log::info!("  - Description: {}", dataset.metadata().description);

    let model_config = MlpConfig {
        input_dim: dataset.feature_dim(),
        hidden_sizes: config.hidden_sizes.clone(),
        num_classes: dataset.num_classes(),
        loss_head_size: config
            .acquisition_method
            .needs_loss_head()
            .then_some(config.learning_loss_layer_size),
    };
    let model = MlpClassifier::new(model_config, &device)?;
    let trainer = ClassifierTrainer::new(TrainingConfig::from(&config));
    let strategy = strategy::build(&config);

    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut sink = MultiSink::new().with(Box::new(LogSink));
    if let Some(path) = &config.metrics_path {
        log::info!("Writing metrics to: {}", path.display());
        sink = sink.with(Box::new(JsonLinesSink::create(path)?));
    }

    let mut controller = RoundController::prepare(config, &dataset, model, trainer, strategy, rng)?
        .with_sink(Box::new(sink))
        .with_device(device);

    let reports = controller.run()?;

    log::info!("=== Run complete ===");
    for report in &reports {
        log::info!(
            "Round {}: labeled={}, epochs={}, test_acc={}",
            report.round,
            report.labeled,
            report.fit.epochs,
            report
                .eval
                .test_accuracy
                .map_or_else(|| "n/a".to_string(), |a| format!("{:.4}", a))
        );
    }

    Ok(())
}
