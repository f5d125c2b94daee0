use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::evaluation::Accuracy;
use crate::layers::linear::LinearLayer;
use crate::layers::lstm_cell::LSTMCell;
use crate::models::cycle_model::{CycleModel, NUM_FEATURES};
use crate::models::lstm_network::LSTMNetwork;
use crate::normalization::Normalizer;

/// Errors that can occur during model persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary encoding error: {0}")]
    Binary(#[from] bincode::Error),
    #[error("corrupt model file: {0}")]
    InvalidModel(String),
}

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize)]
struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl SerializableArray2 {
    fn into_array(
        self,
        expected: (usize, usize),
        name: &str,
    ) -> Result<Array2<f64>, PersistenceError> {
        if self.shape != expected {
            return Err(PersistenceError::InvalidModel(format!(
                "{} has shape {:?}, expected {:?}",
                name, self.shape, expected
            )));
        }
        Array2::from_shape_vec(self.shape, self.data)
            .map_err(|e| PersistenceError::InvalidModel(format!("{}: {}", name, e)))
    }
}

#[derive(Serialize, Deserialize)]
struct SerializableLSTMCell {
    w_ih: SerializableArray2,
    w_hh: SerializableArray2,
    b_ih: SerializableArray2,
    b_hh: SerializableArray2,
    input_size: usize,
    hidden_size: usize,
}

impl From<&LSTMCell> for SerializableLSTMCell {
    fn from(cell: &LSTMCell) -> Self {
        Self {
            w_ih: (&cell.w_ih).into(),
            w_hh: (&cell.w_hh).into(),
            b_ih: (&cell.b_ih).into(),
            b_hh: (&cell.b_hh).into(),
            input_size: cell.input_size,
            hidden_size: cell.hidden_size,
        }
    }
}

impl SerializableLSTMCell {
    fn into_cell(self, layer: usize) -> Result<LSTMCell, PersistenceError> {
        let gates = 4 * self.hidden_size;
        let name = |param: &str| format!("layer {} {}", layer, param);
        Ok(LSTMCell {
            w_ih: self.w_ih.into_array((gates, self.input_size), &name("w_ih"))?,
            w_hh: self.w_hh.into_array((gates, self.hidden_size), &name("w_hh"))?,
            b_ih: self.b_ih.into_array((gates, 1), &name("b_ih"))?,
            b_hh: self.b_hh.into_array((gates, 1), &name("b_hh"))?,
            input_size: self.input_size,
            hidden_size: self.hidden_size,
        })
    }
}

/// Serializable cycle model: LSTM stack plus dense head
#[derive(Serialize, Deserialize)]
pub struct SerializableCycleModel {
    cells: Vec<SerializableLSTMCell>,
    head_weight: SerializableArray2,
    head_bias: SerializableArray2,
    hidden_size: usize,
}

impl From<&CycleModel> for SerializableCycleModel {
    fn from(model: &CycleModel) -> Self {
        Self {
            cells: model.network.get_cells().iter().map(|cell| cell.into()).collect(),
            head_weight: (&model.head.weight).into(),
            head_bias: (&model.head.bias).into(),
            hidden_size: model.hidden_size(),
        }
    }
}

impl TryFrom<SerializableCycleModel> for CycleModel {
    type Error = PersistenceError;

    fn try_from(saved: SerializableCycleModel) -> Result<Self, Self::Error> {
        if saved.cells.is_empty() {
            return Err(PersistenceError::InvalidModel("model has no LSTM layers".to_string()));
        }

        let cells = saved
            .cells
            .into_iter()
            .enumerate()
            .map(|(layer, cell)| cell.into_cell(layer))
            .collect::<Result<Vec<_>, _>>()?;

        for (layer, cell) in cells.iter().enumerate() {
            let expected_input = if layer == 0 { NUM_FEATURES } else { saved.hidden_size };
            if cell.input_size != expected_input || cell.hidden_size != saved.hidden_size {
                return Err(PersistenceError::InvalidModel(format!(
                    "layer {} has inconsistent sizes",
                    layer
                )));
            }
        }

        let weight = saved
            .head_weight
            .into_array((NUM_FEATURES, saved.hidden_size), "head weight")?;
        let bias = saved.head_bias.into_array((NUM_FEATURES, 1), "head bias")?;

        Ok(CycleModel::from_parts(
            LSTMNetwork::from_cells(cells, NUM_FEATURES, saved.hidden_size),
            LinearLayer::from_weights(weight, bias),
        ))
    }
}

/// Model metadata for tracking training information
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub total_epochs: usize,
    pub final_loss: Option<f64>,
    pub accuracy: Option<Accuracy>,
    pub description: Option<String>,
}

impl ModelMetadata {
    /// Metadata stamped with the crate version and the current time
    pub fn new(model_name: impl Into<String>, model: &CycleModel) -> Self {
        ModelMetadata {
            model_name: model_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            hidden_size: model.hidden_size(),
            num_layers: model.num_layers(),
            total_epochs: 0,
            final_loss: None,
            accuracy: None,
            description: None,
        }
    }
}

/// Complete saved model: weights, the normalizer they were trained with, metadata
#[derive(Serialize, Deserialize)]
pub struct SavedModel {
    pub model: SerializableCycleModel,
    pub normalizer: Normalizer,
    pub metadata: ModelMetadata,
}

impl SavedModel {
    pub fn new(model: &CycleModel, normalizer: Normalizer, metadata: ModelMetadata) -> Self {
        SavedModel {
            model: model.into(),
            normalizer,
            metadata,
        }
    }

    pub fn into_parts(self) -> Result<(CycleModel, Normalizer, ModelMetadata), PersistenceError> {
        let model = CycleModel::try_from(self.model)?;
        Ok((model, self.normalizer, self.metadata))
    }
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(
        model: &SavedModel,
        path: P,
    ) -> Result<(), PersistenceError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, model)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(
        model: &SavedModel,
        path: P,
    ) -> Result<(), PersistenceError> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, model)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Save as JSON for a `.json` extension, binary otherwise
    pub fn save<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        if is_json(path.as_ref()) {
            Self::save_to_json(model, path)
        } else {
            Self::save_to_binary(model, path)
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        if is_json(path.as_ref()) {
            Self::load_from_json(path)
        } else {
            Self::load_from_binary(path)
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}
