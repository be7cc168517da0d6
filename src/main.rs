use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sprite_cutout::config::ServiceKind;
use sprite_cutout::{
  BackgroundHint, ClassificationParameters, Cutout, CutoutConfig, Failure, GenerationRequest,
  Orchestrator,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "sprite-cutout", version, about = "Generate sprites and cut out their backgrounds")]
struct Cli {
  /// TOML configuration file
  #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
  config: Option<PathBuf>,

  /// Skip the remote removal service
  #[arg(long, global = true)]
  local_only: bool,

  /// Override the background color tolerance
  #[arg(long, global = true)]
  tolerance: Option<f64>,

  /// Use the chroma-key green preset
  #[arg(long, global = true)]
  chroma_green: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Generate an image from a prompt and remove its background
  Generate {
    prompt: String,
    #[arg(long, default_value_t = 512)]
    width: u32,
    #[arg(long, default_value_t = 512)]
    height: u32,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    model: Option<String>,
    /// Background the generator is asked to draw
    #[arg(long, value_enum, default_value_t = Hint::White)]
    hint: Hint,
    #[arg(long)]
    enhance: bool,
    #[arg(long)]
    private: bool,
    #[arg(long)]
    nologo: bool,
    /// Directory receiving the original and transparent images
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    out_dir: PathBuf,
  },
  /// Remove the background of a local file or an image URL
  Remove {
    input: String,
    /// Output path (default: <input stem>_transparent.png)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Hint {
  White,
  Green,
  None,
}

impl From<Hint> for BackgroundHint {
  fn from(hint: Hint) -> Self {
    match hint {
      Hint::White => BackgroundHint::White,
      Hint::Green => BackgroundHint::ChromaGreen,
      Hint::None => BackgroundHint::None,
    }
  }
}

fn load_config(cli: &Cli) -> Result<CutoutConfig> {
  let mut config = match &cli.config {
    Some(path) => CutoutConfig::load(path)?,
    None => CutoutConfig::default(),
  };

  if cli.chroma_green {
    config.classification = ClassificationParameters::chroma_green();
  }
  if let Some(tolerance) = cli.tolerance {
    config.classification.tolerance_distance = tolerance;
  }
  if cli.local_only {
    config.remote.service = ServiceKind::None;
  }

  config.validate()?;
  Ok(config)
}

/// Lowercase the prompt and keep word characters, spaces become underscores
fn file_stem_for(prompt: &str) -> String {
  let stem: String = prompt
    .chars()
    .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
    .collect::<String>()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join("_")
    .to_lowercase();

  if stem.is_empty() {
    "sprite".to_string()
  } else {
    stem.chars().take(60).collect()
  }
}

fn extension_for(bytes: &[u8]) -> &'static str {
  image::guess_format(bytes)
    .ok()
    .and_then(|format| format.extensions_str().first().copied())
    .unwrap_or("bin")
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
  std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
  println!("Saved: {}", path.display());
  Ok(())
}

/// Where to keep the unprocessed image when `target` was meant for the cutout
///
/// The `_transparent` suffix is dropped and the extension follows the image
/// format. A name that would collide with `target` gets an `_original` suffix.
fn original_path_for(target: &Path, original: &[u8]) -> PathBuf {
  let extension = extension_for(original);
  let stem = target
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "cutout".to_string());
  let base = stem.strip_suffix("_transparent").unwrap_or(&stem);

  let path = target.with_file_name(format!("{}.{}", base, extension));
  if path == target {
    target.with_file_name(format!("{}_original.{}", base, extension))
  } else {
    path
  }
}

/// Keep the unprocessed image when it exists so the user still gets something
fn report_failure(failure: Failure, target: &Path) -> anyhow::Error {
  if let Some(original) = &failure.original {
    let path = original_path_for(target, original);
    match write_file(&path, original) {
      Ok(()) => log::warn!("Background removal failed; kept the original image only"),
      Err(e) => log::error!("{:#}", e),
    }
  }
  anyhow::Error::new(failure)
}

fn write_cutout(cutout: &Cutout, dir: &Path, stem: &str) -> Result<()> {
  let original = dir.join(format!("{}.{}", stem, extension_for(&cutout.original)));
  let transparent = dir.join(format!(
    "{}_transparent.{}",
    stem,
    extension_for(&cutout.result.bytes)
  ));

  write_file(&original, &cutout.original)?;
  write_file(&transparent, &cutout.result.bytes)?;
  println!(
    "Background removed ({:?}, {}x{}, stages: {:?})",
    cutout.result.origin, cutout.result.width, cutout.result.height, cutout.trace
  );
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let cli = Cli::parse();
  let config = load_config(&cli)?;
  let orchestrator = Orchestrator::from_config(&config)?;

  match cli.command {
    Command::Generate {
      prompt,
      width,
      height,
      seed,
      model,
      hint,
      enhance,
      private,
      nologo,
      out_dir,
    } => {
      let request = GenerationRequest {
        width,
        height,
        seed,
        model,
        enhance,
        private,
        nologo,
        hint: hint.into(),
        ..GenerationRequest::new(prompt)
      };
      let stem = file_stem_for(&request.prompt);
      std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

      let base = config.generation.base_url()?;
      let cutout = orchestrator
        .process_request(&request, &base)
        .await
        .map_err(|failure| report_failure(failure, &out_dir.join(&stem)))?;
      write_cutout(&cutout, &out_dir, &stem)
    }
    Command::Remove { input, output } => {
      let is_url = input.starts_with("http://") || input.starts_with("https://");
      let output = output.unwrap_or_else(|| {
        let stem = if is_url {
          "cutout".to_string()
        } else {
          Path::new(&input)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cutout".to_string())
        };
        PathBuf::from(format!("{}_transparent.png", stem))
      });

      let result = if is_url {
        orchestrator
          .process_url(&input)
          .await
          .map(|cutout| cutout.result.bytes.clone())
      } else {
        let bytes =
          std::fs::read(&input).with_context(|| format!("Failed to read {}", input))?;
        orchestrator
          .process_bytes(bytes)
          .await
          .map(|cutout| cutout.result.bytes)
      };

      let bytes = result.map_err(|failure| report_failure(failure, &output))?;
      write_file(&output, &bytes)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_stem_is_filesystem_friendly() {
    assert_eq!(file_stem_for("Red Fox, running!"), "red_fox_running");
    assert_eq!(file_stem_for("  ***  "), "sprite");
  }

  #[test]
  fn failed_cutout_keeps_original_under_its_own_name() {
    let png = sprite_cutout::process::encode_png(&image::RgbaImage::new(2, 2)).unwrap();

    assert_eq!(
      original_path_for(Path::new("out/cat_transparent.png"), &png),
      PathBuf::from("out/cat.png")
    );
    assert_eq!(
      original_path_for(Path::new("out/red_fox"), &png),
      PathBuf::from("out/red_fox.png")
    );
    assert_eq!(
      original_path_for(Path::new("cutout.png"), &png),
      PathBuf::from("cutout_original.png")
    );
    assert_eq!(
      original_path_for(Path::new("x_transparent.png"), b"??"),
      PathBuf::from("x.bin")
    );
  }

  #[test]
  fn cli_parses_remove() {
    let cli = Cli::parse_from(["sprite-cutout", "--local-only", "remove", "in.jpg"]);
    assert!(cli.local_only);
    assert!(matches!(cli.command, Command::Remove { ref input, output: None } if input == "in.jpg"));
  }

  #[test]
  fn overrides_apply_on_top_of_config() {
    let cli = Cli::parse_from([
      "sprite-cutout",
      "--chroma-green",
      "--tolerance",
      "20",
      "--local-only",
      "remove",
      "x.png",
    ]);
    let config = load_config(&cli).unwrap();

    assert!(config.classification.chroma_green_enabled);
    assert_eq!(config.classification.tolerance_distance, 20.0);
    assert_eq!(config.remote.service, ServiceKind::None);
  }
}
