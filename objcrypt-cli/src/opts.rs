use clap::{Parser, ValueHint};

/// Command line interface for objcrypt, fetching and decrypting client-side encrypted objects.
#[derive(Parser, Debug)]
#[clap(name = "objcrypt", version = "0.1")]
pub struct Opts {
    #[clap(subcommand)]
    pub subcmd: Subcommand,
}

#[derive(Parser, Debug)]
pub enum Subcommand {
    Get(GetOpts),
}

/// Fetch and decrypt an object.
#[derive(Parser, Debug)]
#[clap(name = "Get")]
pub struct GetOpts {
    /// Object storage endpoint URL.
    #[clap(index = 1, value_hint = ValueHint::Url)]
    pub endpoint: String,

    /// Object key.
    #[clap(index = 2)]
    pub key: String,

    /// Bucket, addressed path-style below the endpoint. Omit when the endpoint is the bucket.
    #[clap(short, long)]
    pub bucket: Option<String>,

    /// Byte range to fetch, `bytes=<start>-<end>`. Requires --legacy.
    #[clap(short, long)]
    pub range: Option<String>,

    /// Base64 encoded AES-256 data key, defaults to $OBJCRYPT_DATA_KEY.
    #[clap(short = 'k', long)]
    pub data_key: Option<String>,

    /// JSON pipeline configuration file.
    #[clap(short, long, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Enable legacy unauthenticated modes (CBC objects and ranged gets).
    #[clap(long)]
    pub legacy: bool,

    /// Release plaintext before the authentication tag has been checked.
    #[clap(long)]
    pub delayed_auth: bool,

    /// Largest object to decrypt in buffered mode, in bytes.
    #[clap(long)]
    pub buffer_size: Option<u64>,

    /// Never look for instruction files.
    #[clap(long)]
    pub no_instruction_file: bool,

    /// Output file, defaults to stdout.
    #[clap(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<String>,
}
