use std::sync::Arc;

use log::info;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use objcrypt_core::config::PipelineConfig;
use objcrypt_core::materials::StaticMaterialsManager;
use objcrypt_core::pipeline::Pipeline;
use objcrypt_core::store::GetObjectRequest;

use crate::client::HttpStore;
use crate::opts::GetOpts;
use crate::util::{data_key, CliError, ProgressWriter};

/// Builds the pipeline configuration: the config file first, then the flags.
pub(crate) fn config(opts: &GetOpts) -> Result<PipelineConfig, CliError> {
    let mut config = match &opts.config {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => PipelineConfig::default(),
    };

    if opts.legacy {
        config.enable_legacy_unauthenticated_modes = true;
    }
    if opts.delayed_auth {
        config.enable_delayed_authentication = true;
    }
    if let Some(size) = opts.buffer_size {
        config.buffer_size = Some(size);
    }
    if opts.no_instruction_file {
        config.instruction_file.disabled = true;
    }

    Ok(config)
}

pub async fn exec(opts: GetOpts) -> Result<(), CliError> {
    let config = config(&opts)?;
    let materials = StaticMaterialsManager::new(data_key(opts.data_key.clone())?)?;
    let store = HttpStore::new(&opts.endpoint, opts.bucket.is_some())?;

    let pipeline = Pipeline::new(Arc::new(store), Arc::new(materials), config)?;

    let mut request = GetObjectRequest::new(opts.bucket.clone().unwrap_or_default(), &opts.key);
    if let Some(range) = &opts.range {
        request = request.with_range(range);
    }

    info!("fetching {}", opts.key);

    let written = match &opts.output {
        Some(path) => {
            let file = tokio::fs::File::create(path).await?;
            let consumer = ProgressWriter::new(file.compat_write());
            pipeline.get_object_with(request, consumer).await?
        }
        None => {
            let consumer = ProgressWriter::new(tokio::io::stdout().compat_write());
            pipeline.get_object_with(request, consumer).await?
        }
    };

    info!("decrypted {written} bytes");

    Ok(())
}
