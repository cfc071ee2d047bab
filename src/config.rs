use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::errors::Result;
use crate::options::ModelOptions;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Image segmentation tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the native segmentation module (default: platform library name)
    #[arg(long, global = true)]
    pub native_lib: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate segmentation mask from input image
    Mask(CommonArgs),
    /// Apply background to segmentation result
    Apply(ApplyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the segmentation model directory
    #[arg(short, long, value_parser = non_blank_path)]
    pub model: PathBuf,

    /// Path to the input image file
    #[arg(short, long, value_parser = non_blank_path)]
    pub input: PathBuf,

    /// Path to save the output image
    #[arg(short, long, value_parser = non_blank_path)]
    pub output: PathBuf,

    /// Enable GPU runtime
    #[arg(long)]
    pub enable_gpu: bool,

    /// GPU memory (MB) to reserve when enabling GPU [default: 100]
    #[arg(long)]
    pub gpu_mem_size: Option<i32>,

    /// CPU math library thread count [default: 20]
    #[arg(long)]
    pub cpu_threads: Option<i32>,

    /// Enable oneDNN optimizations
    #[arg(long)]
    pub enable_onednn: bool,

    /// Enable ONNXRuntime integration
    #[arg(long)]
    pub enable_onnxruntime: bool,

    /// JSON file with model options; flags given on the command line override it
    #[arg(long)]
    pub options: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Background color in r,g,b format (e.g., 255,255,255)
    #[arg(short = 'c', long)]
    pub bg_color: Option<String>,

    /// Path to background image file
    #[arg(short = 'b', long)]
    pub bg_image: Option<PathBuf>,
}

impl Command {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Self::Mask(args) => args,
            Self::Apply(args) => &args.common,
        }
    }
}

impl CommonArgs {
    /// Options file (or defaults) with the command-line flags applied on top.
    pub fn model_options(&self) -> Result<ModelOptions> {
        let mut options = match &self.options {
            Some(path) => ModelOptions::from_file(path)?,
            None => ModelOptions::default(),
        };

        if self.enable_gpu {
            options.enable_use_gpu = true;
        }
        if let Some(gpu_mem_size) = self.gpu_mem_size {
            options.gpu_mem_size = gpu_mem_size;
        }
        if let Some(cpu_threads) = self.cpu_threads {
            options.cpu_thread_num = cpu_threads;
        }
        if self.enable_onednn {
            options.enable_one_dnn = true;
        }
        if self.enable_onnxruntime {
            options.enable_onnx_runtime = true;
        }
        Ok(options)
    }
}

fn non_blank_path(s: &str) -> std::result::Result<PathBuf, String> {
    if s.trim().is_empty() {
        return Err("value must not be blank".to_string());
    }
    Ok(PathBuf::from(s))
}
