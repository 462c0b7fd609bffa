/// Replay tool for native builds.
///
/// Loads a business-record JSON file into a scene, then prints the records
/// the scene converts back out. Useful to check what a saved annotation file
/// looks like after validation.
#[cfg(not(target_arch = "wasm32"))]
mod replay {
    use std::path::PathBuf;

    use clap::Parser;
    use labelworker::convert::{BusinessRecord, IGNORE_AREA_NAME, records_from_json};
    use labelworker::{ConfigError, ConversionError, LabelConfig, Scene};

    #[derive(Debug, thiserror::Error)]
    pub enum ReplayError {
        #[error("failed to load configuration: {0}")]
        Config(#[from] ConfigError),
        #[error("failed to read records: {0}")]
        Io(#[from] std::io::Error),
        #[error("conversion failed: {0}")]
        Conversion(#[from] ConversionError),
    }

    #[derive(Parser, Debug)]
    #[command(
        name = "labelworker-replay",
        about = "Load business records into a scene and print them back"
    )]
    pub struct Args {
        /// Configuration file; the default path is used when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON array of business records
        input: PathBuf,
    }

    /// Type names in first-seen order, so colors are stable for a given file.
    pub fn type_names(records: &[BusinessRecord]) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for record in records {
            let name = record.name();
            if name != IGNORE_AREA_NAME && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn run(args: Args) -> Result<(), ReplayError> {
        let config = match &args.config {
            Some(path) => LabelConfig::load(path)?,
            None => LabelConfig::load_from_default_path().unwrap_or_default(),
        };

        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(config.log_level.name().to_lowercase()),
        )
        .init();

        let json = std::fs::read_to_string(&args.input)?;
        let records = records_from_json(&json)?;
        let names = type_names(&records);
        log::info!("Replaying {} records with {} types", records.len(), names.len());

        let mut scene = Scene::new(config);
        scene.register_type_list(names.as_slice());
        let loaded = scene.load_business(&records)?;
        log::info!("Loaded {} shapes from {:?}", loaded, args.input);

        println!("{}", scene.business_json()?);
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_args_parse() {
            let args = Args::try_parse_from(["labelworker-replay", "--config", "c.json", "in.json"]).unwrap();
            assert_eq!(args.config, Some(PathBuf::from("c.json")));
            assert_eq!(args.input, PathBuf::from("in.json"));

            assert!(Args::try_parse_from(["labelworker-replay"]).is_err());
            assert!(Args::try_parse_from(["labelworker-replay", "a.json", "b.json"]).is_err());
        }

        #[test]
        fn test_type_names_skip_ignore_area_and_repeats() {
            let records = records_from_json(
                r#"[{"name": "person", "coordinates": []}, {"name": "ignoreArea"},
                    {"name": "car", "coordinates": []}, {"name": "person", "coordinates": []}]"#,
            )
            .unwrap();
            assert_eq!(type_names(&records), vec!["person", "car"]);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use clap::Parser;

    if let Err(e) = replay::run(replay::Args::parse()) {
        eprintln!("Replay error: {}", e);
        std::process::exit(1);
    }
}

// WASM has no replay entry point
#[cfg(target_arch = "wasm32")]
fn main() {}
