/*!
# Overview
rgw-migrate copies the accounts, containers and objects of one RADOS Gateway cluster to another.
It is differential: every run compares the source with the destination and only moves what is
missing or different, so an interrupted or partially failed migration is finished by running it again.

## Features
- Identity provisioning
  Owners are created on the destination with the same display name and both quota classes
  (user and bucket) of the source. A swift subuser is created where needed to move the data.

- Container provisioning
  Containers are created with the storage policy, ACL and metadata headers of the source, and are
  re-linked to their real owner when the destination filed them under another identity.

- Manifest aware comparison
  Plain objects are compared by size and MD5. Segmented (`X-Object-Manifest`) objects list with
  size 0, so their resolved size and manifest pointer are read with a HEAD before deciding.
  Segment data is expected to live in its own container, which is migrated like any other.

- Bounded concurrency
  One walker enumerates the source and feeds a bounded job queue drained by `-j` transfer workers.
  A failed or panicking transfer is reported and never stops the others.

- Two traversal orders
  `owner-first` (identities, then their containers) or `bucket-first` (every container, then its owner).

## As a library
The CLI is a thin wrapper of the library. [`Pipeline::with_clusters`] runs against any
[`storage::StorageAdmin`] / [`storage::ObjectData`] implementation, e.g. the in-process
[`storage::memory::InMemoryCluster`].

Example usage
=============

```no_run
use rgw_migrate::config::args::build_config_from_args;
use rgw_migrate::pipeline::Pipeline;
use rgw_migrate::types::token::create_pipeline_cancellation_token;

#[tokio::main]
async fn main() {
    // Same arguments as the CLI.
    let args = vec![
        "program_name",
        "--jobs",
        "16",
        "rgw1.example.com:7480:admin_access_key:admin_secret_key",
        "rgw2.example.com:7480:admin_access_key:admin_secret_key",
    ];
    let config = build_config_from_args(args).unwrap();

    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = Pipeline::new(config, cancellation_token).unwrap();

    pipeline.run().await;

    if pipeline.has_error() {
        println!("{:?}", pipeline.get_errors_and_consume().unwrap());
    }

    let summary = pipeline.get_summary();
    println!(
        "transferred {} objects, {} failed, {} bytes",
        summary.objects_succeeded, summary.objects_failed, summary.bytes_transferred
    );
}
```
*/

pub use config::Config;
pub use config::args::CLIArgs;
pub use pipeline::Pipeline;

pub mod config;
pub mod pipeline;
pub mod storage;
pub mod types;
