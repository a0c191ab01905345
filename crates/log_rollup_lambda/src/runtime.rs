use aws_config::BehaviorVersion;
use log_rollup_core::error::RollupError;
use tokio::runtime::Handle;

use crate::adapters::aws_s3::S3StoreFactory;
use crate::adapters::aws_sqs::SqsTaskQueue;
use crate::adapters::aws_sts::StsRoleProvider;
use crate::config::{QueueLocation, RollupConfig, MISSING_QUEUE};
use crate::handlers::archiver::ArchiverDeps;
use crate::handlers::producer::ProducerDeps;

/// AWS-backed collaborators shared by every invocation of a process.
pub struct AwsServices {
    pub config: RollupConfig,
    pub roles: StsRoleProvider,
    pub stores: S3StoreFactory,
    pub queue: Option<SqsTaskQueue>,
    /// Region of the loaded SDK configuration, when one resolved.
    pub region: Option<String>,
}

impl AwsServices {
    /// Loads the ambient SDK configuration and resolves the task queue.
    ///
    /// Must run inside a multi-threaded tokio runtime; the adapters block on
    /// the captured handle from synchronous handler code.
    pub async fn load(config: RollupConfig) -> Result<Self, RollupError> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let runtime = Handle::current();
        let sqs_client = aws_sdk_sqs::Client::new(&sdk_config);
        let region = sdk_config.region().map(|region| region.to_string());

        let queue_url = match &config.queue {
            Some(QueueLocation::Url(url)) => Some(url.clone()),
            Some(QueueLocation::Name(name)) => Some(
                SqsTaskQueue::resolve_queue_url(&sqs_client, name)
                    .await
                    .map_err(RollupError::Config)?,
            ),
            None => None,
        };

        Ok(Self {
            roles: StsRoleProvider::new(aws_sdk_sts::Client::new(&sdk_config), runtime.clone()),
            stores: S3StoreFactory::new(sdk_config, runtime.clone()),
            queue: queue_url.map(|url| SqsTaskQueue::new(sqs_client, url, runtime)),
            region,
            config,
        })
    }

    pub fn archiver_deps(&self) -> ArchiverDeps<'_> {
        ArchiverDeps {
            roles: &self.roles,
            stores: &self.stores,
        }
    }

    pub fn producer_deps(&self) -> Result<ProducerDeps<'_>, RollupError> {
        let queue = self.queue()?;
        Ok(ProducerDeps {
            roles: &self.roles,
            stores: &self.stores,
            queue,
            region: self.region.as_deref(),
        })
    }

    pub fn queue(&self) -> Result<&SqsTaskQueue, RollupError> {
        self.queue
            .as_ref()
            .ok_or_else(|| RollupError::Config(MISSING_QUEUE.to_string()))
    }
}
