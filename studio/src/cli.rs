use std::path::PathBuf;

use flux_engine::{GenerationRequest, Model};

#[derive(Debug, clap::Parser)]
#[command(name = "image-studio", about = "Generate images with the Black Forest Labs API")]
pub struct Cli {
    /// API key, takes precedence over API_KEY and the config file
    #[arg(short = 'k', long, global = true)]
    pub api_key: Option<String>,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Submit a generation request and wait for the image
    Generate(Generate),
    /// Fetch the status of a task once
    Status { id: String },
    /// Write settings to the config file
    Configure(Configure),
    /// List the available models
    Models,
}

#[derive(Debug, clap::Args)]
pub struct Generate {
    #[arg(short, long, default_value = "ein fantastisches bild")]
    pub prompt: String,

    /// Width in pixels, a multiple of 32
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(256..=1440))]
    pub width: u32,

    /// Height in pixels, a multiple of 32
    #[arg(long, default_value_t = 768, value_parser = clap::value_parser!(u32).range(256..=1440))]
    pub height: u32,

    #[arg(long, default_value_t = 28, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub steps: u32,

    #[arg(long)]
    pub prompt_upsampling: bool,

    #[arg(long, default_value_t = 42, conflicts_with = "no_seed")]
    pub seed: u64,

    /// Let the service pick a random seed
    #[arg(long)]
    pub no_seed: bool,

    #[arg(long, default_value_t = 3.0)]
    pub guidance: f64,

    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=6))]
    pub safety_tolerance: u8,

    /// Overrides the model from the config file
    #[arg(short, long)]
    pub model: Option<Model>,
}

impl Generate {
    pub fn to_request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt.clone(),
            width: self.width,
            height: self.height,
            steps: self.steps,
            prompt_upsampling: self.prompt_upsampling,
            seed: (!self.no_seed).then_some(self.seed),
            guidance: self.guidance,
            safety_tolerance: self.safety_tolerance,
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct Configure {
    /// Store this key in the config file
    #[arg(long)]
    pub store_key: Option<String>,

    #[arg(long)]
    pub model: Option<Model>,

    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Maximum number of polls, 0 polls until the task finishes
    #[arg(long)]
    pub max_polls: Option<u32>,
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;

    #[test]
    fn generate_defaults_match_request_defaults() {
        let cli = Cli::parse_from(["image-studio", "generate"]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.to_request(), GenerationRequest::default());
    }

    #[test]
    fn generate_flags_build_request() {
        let cli = Cli::parse_from([
            "image-studio",
            "generate",
            "--prompt",
            "a cat",
            "--width",
            "512",
            "--height",
            "512",
            "--steps",
            "20",
            "--no-seed",
            "--safety-tolerance",
            "6",
            "--model",
            "flux-pro-1.1",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let req = args.to_request();
        assert_eq!(req.prompt, "a cat");
        assert_eq!((req.width, req.height, req.steps), (512, 512, 20));
        assert_eq!(req.seed, None);
        assert_eq!(req.safety_tolerance, 6);
        assert_eq!(args.model, Some(Model::FluxPro11));
    }

    #[test]
    fn out_of_range_flags_are_rejected() {
        assert!(Cli::try_parse_from(["image-studio", "generate", "--width", "128"]).is_err());
        assert!(Cli::try_parse_from(["image-studio", "generate", "--steps", "51"]).is_err());
        assert!(
            Cli::try_parse_from(["image-studio", "generate", "--safety-tolerance", "7"]).is_err()
        );
    }
}
