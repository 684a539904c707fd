//! Declarative creation of the test buckets.
//!
//! Two buckets are declared per project, one with object versioning and one
//! without, and their `gs://` URLs are exported under fixed output names.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::StorageClient;
use crate::error::ClientResult;
use crate::models::Bucket;

/// Output name of the unversioned bucket's URL.
pub const OUTPUT_NO_VERSIONING: &str = "bucket_name_no_versioning";

/// Output name of the versioned bucket's URL.
pub const OUTPUT_VERSIONING: &str = "bucket_name_versioning";

/// A bucket to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    pub versioning: bool,
    /// Output name under which the bucket's URL is exported.
    pub output: &'static str,
}

/// The set of buckets to create for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub buckets: Vec<BucketSpec>,
}

/// Named outputs of an applied plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionOutputs {
    pub bucket_name_no_versioning: String,
    pub bucket_name_versioning: String,
}

impl ProvisionPlan {
    /// Declares `{project}-tests-no-versioning` and `{project}-tests-versioning`.
    pub fn for_project(project: &str) -> Self {
        Self {
            buckets: vec![
                BucketSpec {
                    name: format!("{}-tests-no-versioning", project),
                    versioning: false,
                    output: OUTPUT_NO_VERSIONING,
                },
                BucketSpec {
                    name: format!("{}-tests-versioning", project),
                    versioning: true,
                    output: OUTPUT_VERSIONING,
                },
            ],
        }
    }

    /// Creates every declared bucket. Buckets that already exist are left as
    /// they are.
    pub async fn apply(&self, client: &StorageClient) -> ClientResult<ProvisionOutputs> {
        let mut outputs = ProvisionOutputs {
            bucket_name_no_versioning: String::new(),
            bucket_name_versioning: String::new(),
        };

        for spec in &self.buckets {
            let bucket = match client.create_bucket(&spec.name, spec.versioning).await {
                Ok(bucket) => bucket,
                Err(err) if err.is_conflict() => {
                    info!(bucket = %spec.name, "bucket already exists");
                    Bucket::new(&spec.name).with_versioning(spec.versioning)
                }
                Err(err) => return Err(err),
            };

            let url = bucket.gs_url();
            match spec.output {
                OUTPUT_VERSIONING => outputs.bucket_name_versioning = url,
                _ => outputs.bucket_name_no_versioning = url,
            }
        }

        Ok(outputs)
    }
}
