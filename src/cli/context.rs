use crate::adapters::keyrings::KeyRingBackend;
use crate::adapters::object_stores::local_store::LocalObjectStore;
use crate::cli::{Cli, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::Result;
use crate::core::services::backup_context::{BackupContext, ContextOptions};
use crate::core::services::backup_service::BackupService;

/// Everything a backup command needs: the loaded config, the bucket store
/// and a bootstrapped backup context.
pub struct Session {
    pub config: AppConfig,
    pub store: LocalObjectStore,
    pub context: BackupContext,
    pub quiet: bool,
}

impl Session {
    /// Load `--config`, open the store under `[store] root` and bootstrap
    /// the keyring from the bucket's key material folder.
    pub fn open(args: &Cli) -> Result<Self> {
        let config = AppConfig::load(&args.config)?;
        let backend: KeyRingBackend = match &args.cipher {
            Some(name) => name.parse()?,
            None => config.backend()?,
        };
        let retain = args.keep_keyring || config.keyring.retain;

        let store = LocalObjectStore::new(config.store.root.clone());
        let parameters = config.parameter_store();
        let options = ContextOptions {
            config_path: args.ssm_path.clone(),
            recipients: (!args.recipients.is_empty()).then(|| args.recipients.clone()),
        };

        let keyring = backend.create(retain)?;
        let context = BackupContext::new(options, keyring, &parameters, &store)?;
        if retain && !args.quiet {
            output::detail(&format!(
                "Keyring kept at {}",
                context.keyring_home().display()
            ));
        }

        Ok(Self {
            config,
            store,
            context,
            quiet: args.quiet,
        })
    }

    pub fn service(&self) -> BackupService<'_, LocalObjectStore> {
        BackupService::new(&self.context, &self.store)
            .with_options(self.config.pipeline_options())
    }
}
