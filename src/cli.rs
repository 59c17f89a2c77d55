use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.yaml, the catalog and the model cache
    #[clap(long, env = "PRODMATCH_DIR", default_value = ".", global = true)]
    pub base_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed the catalog and start the HTTP service.
    Serve {
        /// Listen address, overrides `listen_addr` from config.yaml
        #[clap(long)]
        addr: Option<String>,
    },
    /// Match an image file against the catalog
    Image {
        /// Path to the query image
        path: PathBuf,

        /// Number of matches to return
        #[clap(short, long)]
        k: Option<usize>,
    },
    /// Match a text description against the catalog
    Text {
        /// Query text
        #[clap(allow_hyphen_values = true)]
        text: String,

        /// Number of matches to return
        #[clap(short, long)]
        k: Option<usize>,
    },
    /// Sanity check: match the first product's own image, then a text query.
    Demo {
        /// Text query to run after the image query
        #[clap(long, default_value = "ceramic mug")]
        text: String,
    },
}
