use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use segmark::annotation::{BrushMode, Palette};
use segmark::imaging::scan;
use segmark::output::{run_batch, BatchSelection, LogProgress, PredictionWriter};
use segmark::segmentation::{PixelClassifier, RandomForest};
use segmark::Session;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the images of a working directory in navigation order
    Scan { dir: PathBuf },

    /// Paint or erase disks on an image's mask
    Paint {
        image: PathBuf,

        /// Label ID to paint with
        #[arg(short, long, default_value_t = 1)]
        label: u8,

        /// Brush center as x,y (repeatable)
        #[arg(long = "at", value_parser = parse_point, required = true)]
        points: Vec<(i32, i32)>,

        /// Brush size; the disk radius is half of it
        #[arg(short, long, default_value_t = segmark::annotation::DEFAULT_BRUSH_SIZE)]
        size: u32,

        /// Erase instead of painting
        #[arg(long)]
        erase: bool,
    },

    /// Train a forest on the training set of a manifest
    Train {
        #[arg(short, long)]
        manifest: PathBuf,

        /// Number of trees in the forest
        #[arg(long, default_value_t = 10)]
        trees: usize,

        /// Where to write the model (default: output/model.json)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Predict label maps for a batch of images
    Predict {
        /// Trained model (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Predict every image of this directory
        #[arg(long, conflicts_with = "images")]
        dir: Option<PathBuf>,

        /// Only predict images 1, 3, 5, ...
        #[arg(long)]
        every_second: bool,

        images: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match args.command {
        Command::Scan { dir } => run_scan(&dir),
        Command::Paint {
            image,
            label,
            points,
            size,
            erase,
        } => run_paint(&image, label, &points, size, erase),
        Command::Train {
            manifest,
            trees,
            model,
        } => run_train(&manifest, trees, model),
        Command::Predict {
            model,
            dir,
            every_second,
            images,
        } => run_predict(&model, dir, every_second, images),
    }
}

fn parse_point(s: &str) -> std::result::Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got {:?}", s))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in {:?}: {}", s, e))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in {:?}: {}", s, e))?;
    Ok((x, y))
}

fn run_scan(dir: &Path) -> Result<()> {
    let workspace = scan(dir).with_context(|| format!("Failed to scan {}", dir.display()))?;
    for (index, image) in workspace.images.iter().enumerate() {
        println!("{:>4}  {}", index, image.display());
    }
    Ok(())
}

/// Open the session an image belongs to: the workspace manifest if one was
/// saved, otherwise a fresh scan of the image's directory.
fn open_session_for(image: &Path) -> Result<Session> {
    let dir = image
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut session = Session::new();
    session
        .open_directory(dir)
        .with_context(|| format!("Failed to open {}", dir.display()))?;

    let manifest = session.workspace().default_manifest_path();
    if manifest.exists() {
        session
            .load_manifest(&manifest)
            .with_context(|| format!("Failed to load {}", manifest.display()))?;
    }
    Ok(session)
}

fn run_paint(image: &Path, label: u8, points: &[(i32, i32)], size: u32, erase: bool) -> Result<()> {
    let mut session = open_session_for(image)?;

    let index = session
        .workspace()
        .images
        .iter()
        .position(|p| p.file_name() == image.file_name())
        .with_context(|| format!("{} is not an image of its directory", image.display()))?;
    session.goto(index).context("Failed to open image")?;

    if erase {
        session.brush_mut().mode = BrushMode::Erase;
    } else {
        if label == 0 {
            bail!("label 0 is reserved for unlabeled pixels");
        }
        while !session.labels().ids().contains(&label) {
            let palette = session.palette().clone();
            session
                .labels_mut()
                .add(&palette)
                .with_context(|| format!("Cannot create label {}", label))?;
        }
        session.labels_mut().activate(label);
        session.brush_mut().mode = BrushMode::Paint;
    }
    session.brush_mut().set_size(size);

    for &(x, y) in points {
        session
            .stroke(x, y)
            .with_context(|| format!("Failed to apply brush at {},{}", x, y))?;
    }

    let change = session.flush().context("Failed to save mask")?;
    tracing::info!("Training set: {:?}", change);
    session
        .save_manifest(None)
        .context("Failed to save training set")?;
    Ok(())
}

fn run_train(manifest: &Path, trees: usize, model_path: Option<PathBuf>) -> Result<()> {
    let mut session = Session::new();
    session
        .load_manifest(manifest)
        .with_context(|| format!("Failed to load {}", manifest.display()))?;
    session.train_config_mut().n_trees = trees;

    tracing::info!("Training on {} images", session.registry().len());
    let report = session.train().context("Training failed")?;
    if !report.skipped_features.is_empty() {
        tracing::warn!("Unknown features skipped: {:?}", report.skipped_features);
    }

    let model = session.model().context("Training produced no model")?;
    println!("train accuracy: {:.3}", report.train_accuracy);
    match report.test_accuracy {
        Some(accuracy) => println!("test accuracy:  {:.3}", accuracy),
        None => println!("test accuracy:  n/a"),
    }
    for importance in model.feature_importances() {
        println!(
            "{:<16} {:>6.3} ± {:.3}",
            importance.name, importance.mean, importance.std
        );
    }

    let model_path =
        model_path.unwrap_or_else(|| session.workspace().output_dir().join("model.json"));
    model
        .save_json(&model_path)
        .with_context(|| format!("Failed to save model to {}", model_path.display()))?;
    tracing::info!("Model saved to {}", model_path.display());
    Ok(())
}

fn run_predict(
    model_path: &Path,
    dir: Option<PathBuf>,
    every_second: bool,
    images: Vec<PathBuf>,
) -> Result<()> {
    let model = RandomForest::load_json(model_path)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;
    tracing::info!("Model uses features {:?}", model.feature_names());

    let (root, images) = match dir {
        Some(dir) => {
            let workspace =
                scan(&dir).with_context(|| format!("Failed to scan {}", dir.display()))?;
            (workspace.root, workspace.images)
        }
        None => {
            let Some(first) = images.first() else {
                bail!("no images given, pass image paths or --dir");
            };
            let root = first
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (root, images)
        }
    };

    let mut selection = BatchSelection::new(&images);
    if every_second {
        selection.select_every_second();
    }

    let writer = PredictionWriter::new(root.join("output").join("prediction"))
        .context("Failed to create prediction directory")?;
    let summary = run_batch(
        &model,
        &selection.selected(),
        &Palette::default(),
        &writer,
        &mut LogProgress,
    );

    println!("{} predictions written", summary.written.len());
    for failure in &summary.failures {
        println!("failed: {}: {}", failure.image.display(), failure.error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("3,4"), Ok((3, 4)));
        assert_eq!(parse_point(" -1 , 7"), Ok((-1, 7)));
        assert!(parse_point("3").is_err());
        assert!(parse_point("a,4").is_err());
    }

    #[test]
    fn test_args_parse_subcommands() {
        let args = Args::try_parse_from([
            "segmark", "--debug", "paint", "img_1.png", "--at", "1,2", "--at", "3,4", "-s", "9",
        ])
        .unwrap();
        assert!(args.debug);
        match args.command {
            Command::Paint {
                points, size, label, ..
            } => {
                assert_eq!(points, vec![(1, 2), (3, 4)]);
                assert_eq!(size, 9);
                assert_eq!(label, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
