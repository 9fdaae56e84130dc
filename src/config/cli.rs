use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Pressroom operator binary.
#[derive(Debug, Parser)]
#[command(
    name = "pressroom",
    version,
    about = "Blog data-access and image upload tool"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRESSROOM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        global = true,
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the data service base URL.
    #[arg(long = "service-url", global = true, value_name = "URL")]
    pub service_url: Option<String>,

    /// Override the data service API key.
    #[arg(
        long = "api-key",
        global = true,
        env = "PRESSROOM_API_KEY",
        hide_env_values = true,
        value_name = "KEY"
    )]
    pub api_key: Option<String>,

    /// Disable the query cache for this run.
    #[arg(long = "no-cache", global = true, action = clap::ArgAction::SetTrue)]
    pub no_cache: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List blog posts with their category and tags.
    Posts(PostsArgs),
    /// List blog categories.
    Categories,
    /// List blog tags.
    Tags,
    /// Resize and upload one or more images.
    Upload(UploadArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct PostsArgs {
    /// Only published posts (`published`) or only drafts (`draft`).
    #[arg(long, value_name = "STATUS")]
    pub status: Option<String>,

    /// Filter by category id.
    #[arg(long = "category", value_name = "ID")]
    pub category_id: Option<String>,

    /// Maximum number of posts to return.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u32>,

    /// Number of posts to skip.
    #[arg(long, value_name = "COUNT")]
    pub offset: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct UploadArgs {
    /// Image files to upload.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath, required = true)]
    pub files: Vec<PathBuf>,

    /// Destination folder on the storage service.
    #[arg(long, value_name = "FOLDER")]
    pub folder: Option<String>,

    /// Override the upload endpoint URL.
    #[arg(long = "uploads-endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Override the maximum number of concurrent uploads.
    #[arg(long = "uploads-max-concurrent", value_name = "COUNT")]
    pub max_concurrent: Option<u64>,
}
