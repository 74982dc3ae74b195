//! FILENAME: persistence/src/reader.rs
//! PURPOSE: The Data Source entry point - read a dataset and run the pivot
//! pipeline over it.
//! CONTEXT: Three read modes exist. `File` reads the dataset file and
//! aggregates it locally. `All` is the first read of a dataset: it requires a
//! datapoint column and returns categorical values with the pivoted data.
//! `Increment` re-aggregates after a datapoint or filter change and returns
//! pivoted data only. A caller may also hand over raw rows directly.
//!
//! A failed fetch is not an error: the result is empty so the chart shows
//! "No Data". Configuration problems (unknown dataset, no datapoint) are.

use crate::source::DataSource;
use crate::ReadError;
use engine::{CategoricalValues, MetadataCatalog, MetadataRegistry, Record};
use pivot_engine::{categorical_values, transformed_data, PivotError, PivotPipeline, PivotRequest, TransformRegistry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadMode {
    File,
    All,
    Increment,
}

/// Everything one read produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResult {
    pub categorical_values: CategoricalValues,
    pub pivoted_data: Vec<Record>,
    pub processed_data: Vec<Record>,
}

impl DatasetResult {
    pub fn is_empty(&self) -> bool {
        self.pivoted_data.is_empty() && self.processed_data.is_empty()
    }
}

/// Reads datasets from one source against one metadata registry.
pub struct DatasetReader<'a> {
    metadata: &'a MetadataRegistry,
    transforms: &'a TransformRegistry,
    source: &'a dyn DataSource,
}

impl<'a> DatasetReader<'a> {
    pub fn new(
        metadata: &'a MetadataRegistry,
        transforms: &'a TransformRegistry,
        source: &'a dyn DataSource,
    ) -> Self {
        DatasetReader {
            metadata,
            transforms,
            source,
        }
    }

    /// Reads `dataset` for `request`. `raw_override` replaces the source's
    /// rows (data pushed in by an embedding application) in any mode.
    pub fn read(
        &self,
        mode: ReadMode,
        dataset: &str,
        request: &PivotRequest,
        raw_override: Option<Vec<Record>>,
    ) -> Result<DatasetResult, ReadError> {
        let catalog = self
            .metadata
            .catalog(dataset)
            .map_err(|_| ReadError::UnknownDataset(dataset.to_string()))?;

        if let Some(rows) = raw_override {
            return self.from_raw(rows, request, &catalog);
        }

        // Synthetic datasets are computed from the rows of the dataset they derive from.
        let source_name = catalog.dataset().actual_dataset.as_deref().unwrap_or(dataset);

        match mode {
            ReadMode::File => {
                let rows = self.fetch(source_name).unwrap_or_default();
                self.from_raw(rows, request, &catalog)
            }
            ReadMode::All => {
                if request.datapoint.is_none() {
                    return Err(PivotError::MissingDatapoint.into());
                }
                match self.fetch(source_name) {
                    Some(rows) => self.from_raw(rows, request, &catalog),
                    None => Ok(DatasetResult::default()),
                }
            }
            ReadMode::Increment => match self.fetch(source_name) {
                Some(rows) => {
                    let pivoted_data = transformed_data(&rows, request, &catalog)?;
                    Ok(self.finish(CategoricalValues::new(), pivoted_data, request, &catalog))
                }
                None => Ok(DatasetResult::default()),
            },
        }
    }

    fn fetch(&self, dataset: &str) -> Option<Vec<Record>> {
        match self.source.raw_rows(dataset) {
            Ok(rows) => Some(rows),
            Err(e) => {
                log::warn!(target: "DATA", "could not read dataset {}: {}", dataset, e);
                None
            }
        }
    }

    fn from_raw(
        &self,
        rows: Vec<Record>,
        request: &PivotRequest,
        catalog: &MetadataCatalog,
    ) -> Result<DatasetResult, ReadError> {
        let values = categorical_values(&rows, catalog);
        let pivoted_data = transformed_data(&rows, request, catalog)?;
        Ok(self.finish(values, pivoted_data, request, catalog))
    }

    fn finish(
        &self,
        categorical_values: CategoricalValues,
        pivoted_data: Vec<Record>,
        request: &PivotRequest,
        catalog: &MetadataCatalog,
    ) -> DatasetResult {
        let pipeline = PivotPipeline::new(catalog, self.transforms);
        let processed_data = pipeline.process(
            pivoted_data.clone(),
            request.load_table.as_ref(),
            request.datapoint.as_deref(),
        );
        log::info!(
            target: "DATA",
            "dataset {}: {} pivoted rows, {} processed rows",
            catalog.dataset_name(),
            pivoted_data.len(),
            processed_data.len()
        );
        DatasetResult {
            categorical_values,
            pivoted_data,
            processed_data,
        }
    }
}
