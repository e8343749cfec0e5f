// ============================================================
// PROCESSING PIPELINE
// ============================================================
// parse → infer → persist schema → create table → load → register

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::application::use_cases::registry::ApiRegistry;
use crate::application::use_cases::schema::detect_schema;
use crate::domain::dataset::{Dataset, DatasetStatus};
use crate::domain::error::Result;
use crate::infrastructure::db::datasets::DatasetRepository;
use crate::infrastructure::db::dynamic::DynamicTableManager;
use crate::infrastructure::parse::FileParser;

/// Orchestrates dataset processing. Steps run sequentially because each one
/// depends on the previous step's output; any failure lands the dataset in a
/// consistent `error` state, never a partial `ready`.
#[derive(Clone)]
pub struct ProcessingPipeline {
    datasets: DatasetRepository,
    tables: DynamicTableManager,
    registry: Arc<ApiRegistry>,
    parser: FileParser,
}

impl ProcessingPipeline {
    pub fn new(
        datasets: DatasetRepository,
        tables: DynamicTableManager,
        registry: Arc<ApiRegistry>,
        parser: FileParser,
    ) -> Self {
        Self {
            datasets,
            tables,
            registry,
            parser,
        }
    }

    /// Process an uploaded file end to end. On success the dataset is
    /// `ready` and registered; on failure it is `error` with the message
    /// recorded, and the error is re-signaled to the caller.
    pub async fn process(&self, dataset: &Dataset) -> Result<()> {
        info!(dataset = dataset.slug.as_str(), "processing dataset");

        match self.run_steps(dataset).await {
            Ok(row_count) => {
                self.datasets.mark_ready(&dataset.id, row_count).await?;
                info!(
                    dataset = dataset.slug.as_str(),
                    rows = row_count,
                    "dataset ready"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    dataset = dataset.slug.as_str(),
                    error = %err,
                    "dataset processing failed"
                );
                if let Err(save_err) = self.datasets.mark_error(&dataset.id, &err.to_string()).await
                {
                    error!(
                        dataset = dataset.slug.as_str(),
                        error = %save_err,
                        "failed to record processing error"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_steps(&self, dataset: &Dataset) -> Result<i64> {
        let table = self.parser.parse(Path::new(&dataset.file_path))?;

        let schema = detect_schema(&table);
        info!(
            dataset = dataset.slug.as_str(),
            columns = schema.len(),
            "detected schema"
        );

        self.datasets.replace_columns(&dataset.id, &schema).await?;
        self.tables.create_table(&dataset.table_name, &schema).await?;

        let row_count = self
            .tables
            .bulk_load(&dataset.table_name, &schema, &table)
            .await? as i64;

        self.registry
            .register(&dataset.slug, &dataset.table_name, schema);

        Ok(row_count)
    }

    /// Re-run the full pipeline for an existing dataset, replacing the
    /// previous schema, table, and registry entry wholesale.
    pub async fn reprocess(&self, dataset: &Dataset) -> Result<()> {
        info!(dataset = dataset.slug.as_str(), "re-processing dataset");

        self.datasets
            .update_status(&dataset.id, DatasetStatus::Processing)
            .await?;
        self.registry.unregister(&dataset.slug);
        self.tables.drop_table(&dataset.table_name).await?;

        self.process(dataset).await
    }

    /// Tear a dataset down: backing table first, then the registry entry,
    /// then the record. Reversing this order could leave a registry entry
    /// pointing at a missing table.
    pub async fn delete_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.tables.drop_table(&dataset.table_name).await?;
        self.registry.unregister(&dataset.slug);
        self.datasets.delete(&dataset.id).await?;

        if let Err(err) = std::fs::remove_file(&dataset.file_path) {
            // The upload may already be gone; the dataset itself is deleted.
            info!(
                dataset = dataset.slug.as_str(),
                error = %err,
                "could not remove stored upload"
            );
        }

        info!(dataset = dataset.slug.as_str(), "deleted dataset");
        Ok(())
    }

    /// Register every `ready` dataset at startup, before the server accepts
    /// requests. Per-dataset failures are logged and skipped so one broken
    /// record cannot take the service down.
    pub async fn reload_ready_datasets(&self) -> Result<usize> {
        let ready = self.datasets.list_ready().await?;
        let mut loaded = 0;

        for dataset in &ready {
            match self.datasets.columns_for(&dataset.id).await {
                Ok(columns) => {
                    self.registry
                        .register(&dataset.slug, &dataset.table_name, columns);
                    loaded += 1;
                }
                Err(err) => {
                    error!(
                        dataset = dataset.slug.as_str(),
                        error = %err,
                        "failed to reload dataset"
                    );
                }
            }
        }

        info!(loaded, "reloaded ready datasets");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::DataType;
    use crate::infrastructure::db::api_keys::ApiKeyRepository;
    use crate::infrastructure::db::connection::test_pool;
    use crate::infrastructure::db::datasets::NewDataset;
    use crate::infrastructure::parse::ParseLimits;
    use std::io::Write;

    struct Fixture {
        pipeline: ProcessingPipeline,
        datasets: DatasetRepository,
        registry: Arc<ApiRegistry>,
        tables: DynamicTableManager,
        owner: String,
        _dir: tempfile::TempDir,
        dir_path: std::path::PathBuf,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let keys = ApiKeyRepository::new(pool.clone(), "salt".to_string());
        let (key, _) = keys.generate("owner").await.unwrap();

        let datasets = DatasetRepository::new(pool.clone());
        let tables = DynamicTableManager::new(pool);
        let registry = Arc::new(ApiRegistry::new());
        let parser = FileParser::new(ParseLimits {
            max_rows: 1000,
            max_columns: 50,
        });
        let pipeline = ProcessingPipeline::new(
            datasets.clone(),
            tables.clone(),
            registry.clone(),
            parser,
        );

        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        Fixture {
            pipeline,
            datasets,
            registry,
            tables,
            owner: key.id,
            _dir: dir,
            dir_path,
        }
    }

    impl Fixture {
        fn write_file(&self, name: &str, content: &str) -> String {
            let path = self.dir_path.join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(content.as_bytes()).unwrap();
            path.to_string_lossy().to_string()
        }

        async fn create_dataset(&self, name: &str, file_path: &str) -> Dataset {
            self.datasets
                .create(NewDataset {
                    name: name.to_string(),
                    original_filename: "upload.csv".to_string(),
                    file_path: file_path.to_string(),
                    file_size: 64,
                    api_key_id: self.owner.clone(),
                })
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_process_happy_path() {
        let fx = fixture().await;
        let path = fx.write_file(
            "scores.csv",
            "Name,Score ($)\nAlice,10\nBob,20\nCarol,30\n",
        );
        let dataset = fx.create_dataset("Scores", &path).await;

        fx.pipeline.process(&dataset).await.unwrap();

        let refreshed = fx.datasets.find_by_slug(&dataset.slug).await.unwrap();
        assert_eq!(refreshed.status, DatasetStatus::Ready);
        assert_eq!(refreshed.row_count, 3);
        assert_eq!(refreshed.error_message, "");

        let columns = fx.datasets.columns_for(&dataset.id).await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].field_name, "name");
        assert_eq!(columns[0].data_type, DataType::Text);
        assert!(!columns[0].nullable);
        assert_eq!(columns[1].field_name, "score");
        assert_eq!(columns[1].data_type, DataType::Integer);

        let entry = fx.registry.lookup(&dataset.slug).expect("registered");
        let row = fx
            .tables
            .get_row(&entry.table_name, &entry.columns, 2)
            .await
            .unwrap()
            .expect("row 2");
        assert_eq!(row["name"], serde_json::json!("Bob"));
        assert_eq!(row["score"], serde_json::json!(20));
    }

    #[tokio::test]
    async fn test_process_failure_sets_error_state() {
        let fx = fixture().await;
        let path = fx.write_file("empty.csv", "OnlyHeaders,Here\n");
        let dataset = fx.create_dataset("Broken", &path).await;

        let err = fx.pipeline.process(&dataset).await.unwrap_err();
        assert!(err.to_string().contains("no data rows"));

        let refreshed = fx.datasets.find_by_slug(&dataset.slug).await.unwrap();
        assert_eq!(refreshed.status, DatasetStatus::Error);
        assert!(refreshed.error_message.contains("no data rows"));
        assert!(fx.registry.lookup(&dataset.slug).is_none());
    }

    #[tokio::test]
    async fn test_reprocess_is_deterministic() {
        let fx = fixture().await;
        let path = fx.write_file("stable.csv", "a,b\n1,x\n2,y\n");
        let dataset = fx.create_dataset("Stable", &path).await;

        fx.pipeline.process(&dataset).await.unwrap();
        let first_columns = fx.datasets.columns_for(&dataset.id).await.unwrap();
        let first = fx.datasets.find_by_slug(&dataset.slug).await.unwrap();

        fx.pipeline.reprocess(&dataset).await.unwrap();
        let second_columns = fx.datasets.columns_for(&dataset.id).await.unwrap();
        let second = fx.datasets.find_by_slug(&dataset.slug).await.unwrap();

        assert_eq!(first.row_count, second.row_count);
        assert_eq!(first_columns.len(), second_columns.len());
        for (a, b) in first_columns.iter().zip(second_columns.iter()) {
            assert_eq!(a.field_name, b.field_name);
            assert_eq!(a.data_type, b.data_type);
            assert_eq!(a.nullable, b.nullable);
            assert_eq!(a.unique, b.unique);
        }
        assert!(fx.registry.is_registered(&dataset.slug));
    }

    #[tokio::test]
    async fn test_delete_dataset_tears_everything_down() {
        let fx = fixture().await;
        let path = fx.write_file("gone.csv", "a\n1\n");
        let dataset = fx.create_dataset("Gone", &path).await;

        fx.pipeline.process(&dataset).await.unwrap();
        fx.pipeline.delete_dataset(&dataset).await.unwrap();

        assert!(fx.registry.lookup(&dataset.slug).is_none());
        assert!(fx.datasets.find_by_slug(&dataset.slug).await.is_err());
        // The table name is free again.
        fx.tables
            .create_table(&dataset.table_name, &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reload_ready_datasets() {
        let fx = fixture().await;
        let path = fx.write_file("reload.csv", "a\n1\n2\n");
        let dataset = fx.create_dataset("Reload", &path).await;
        fx.pipeline.process(&dataset).await.unwrap();

        // Simulate a restart with a fresh registry.
        fx.registry.unregister(&dataset.slug);
        let loaded = fx.pipeline.reload_ready_datasets().await.unwrap();
        assert_eq!(loaded, 1);
        assert!(fx.registry.is_registered(&dataset.slug));
    }
}
