use csv::ReaderBuilder;
use serde::Serialize;
use std::{fs::File, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read dataset catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dataset catalog: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column '{column}' in catalog row {row}")]
    MissingColumn { column: &'static str, row: usize },

    #[error("Unknown geometry kind '{0}' (expected 'point' or 'line')")]
    UnknownKind(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
}

/// Whether a dataset holds facilities or line features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Point,
    Line,
}

impl GeometryKind {
    fn parse(raw: &str) -> Result<Self, CatalogError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "point" => Ok(GeometryKind::Point),
            "line" | "linestring" => Ok(GeometryKind::Line),
            other => Err(CatalogError::UnknownKind(other.to_string())),
        }
    }
}

/// How a selectable dataset maps onto a backend table and its styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetConfig {
    pub key: String,
    pub table: String,
    pub name_column: String,
    pub color: String,
    pub icon: String,
    pub title: String,
    pub kind: GeometryKind,
}

impl DatasetConfig {
    fn point(key: &str, table: &str, name_column: &str, color: &str, icon: &str, title: &str) -> Self {
        Self {
            key: key.to_string(),
            table: table.to_string(),
            name_column: name_column.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            title: title.to_string(),
            kind: GeometryKind::Point,
        }
    }
}

/// Ordered list of the datasets a user can pick from.
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    datasets: Vec<DatasetConfig>,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DatasetCatalog {
    /// The civil-defense datasets hosted in the geodata backend.
    pub fn builtin() -> Self {
        Self {
            datasets: vec![
                DatasetConfig::point("brannstasjoner", "NyBrannstasjoner", "brannstasjon", "#EF4444", "🚒", "Brannstasjoner"),
                DatasetConfig::point("sykehus", "sykehus", "navn", "#10B981", "🏥", "Sykehus"),
                DatasetConfig::point("politistasjoner", "politistasjon", "name", "#3B82F6", "👮", "Politistasjoner"),
                DatasetConfig::point("tilfluktsrom", "tilfluktsrom", "navn", "#8B5CF6", "🛡", "Tilfluktsrom"),
            ],
        }
    }

    /// Loads a catalog from a CSV file with a header row:
    /// `key,table,name_column,color,icon,title[,kind]`.
    pub fn from_csv<P: AsRef<Path>>(csv_path: P) -> Result<Self, CatalogError> {
        let file = File::open(csv_path)?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(b',')
            .flexible(true)
            .from_reader(file);

        let mut datasets = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let field = |index: usize, column: &'static str| -> Result<String, CatalogError> {
                record
                    .get(index)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .ok_or(CatalogError::MissingColumn { column, row: row + 1 })
            };

            datasets.push(DatasetConfig {
                key: field(0, "key")?,
                table: field(1, "table")?,
                name_column: field(2, "name_column")?,
                color: field(3, "color")?,
                icon: record.get(4).unwrap_or_default().trim().to_string(),
                title: field(5, "title")?,
                kind: GeometryKind::parse(record.get(6).unwrap_or_default())?,
            });
        }

        log::debug!("Loaded {} datasets from catalog", datasets.len());
        Ok(Self { datasets })
    }

    pub fn get(&self, key: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.key == key)
    }

    /// Like [`get`](Self::get) but reports the unknown key as an error.
    pub fn require(&self, key: &str) -> Result<&DatasetConfig, CatalogError> {
        self.get(key)
            .ok_or_else(|| CatalogError::UnknownDataset(key.to_string()))
    }

    pub fn is_valid_dataset(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetConfig> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
