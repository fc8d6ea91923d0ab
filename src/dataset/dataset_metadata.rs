use serde::{Deserialize, Serialize};

use crate::{data_type::DataType, ArrayShape};

use super::{Compression, DatasetCreateError};

/// Dataset attributes.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// The byte order of chunk elements written on this platform.
pub(crate) const NATIVE_ENDIAN: &str = if cfg!(target_endian = "big") {
    "big"
} else {
    "little"
};

/// The metadata document of a chunked dataset, stored at `{path}/zarr.json`.
///
/// For example:
/// ```json
/// {
///     "zarr_format": 3,
///     "node_type": "array",
///     "shape": [10000, 384],
///     "data_type": "int16",
///     "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [2500, 96]}},
///     "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
///     "fill_value": 0,
///     "codecs": [
///         {"name": "bytes", "configuration": {"endian": "little"}},
///         {"name": "gzip", "configuration": {"level": 4}}
///     ],
///     "attributes": {"neurodata_type": "ElectricalSeries"}
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// The format version. Always 3.
    pub zarr_format: u64,
    /// The node type. Always `array`.
    pub node_type: String,
    /// The shape of the dataset.
    pub shape: ArrayShape,
    /// The element data type.
    pub data_type: DataType,
    /// The chunk grid.
    pub chunk_grid: ChunkGridMetadata,
    /// The chunk key encoding.
    pub chunk_key_encoding: ChunkKeyEncodingMetadata,
    /// The value of elements that have not been written.
    pub fill_value: serde_json::Value,
    /// The codecs, `bytes` followed by an optional compression codec.
    pub codecs: Vec<serde_json::Value>,
    /// User attributes.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Attributes,
}

/// Regular chunk grid metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkGridMetadata {
    /// The chunk grid name. Always `regular`.
    pub name: String,
    /// The chunk grid configuration.
    pub configuration: ChunkGridConfiguration,
}

/// Regular chunk grid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkGridConfiguration {
    /// The chunk shape.
    pub chunk_shape: ArrayShape,
}

/// Chunk key encoding metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkKeyEncodingMetadata {
    /// The chunk key encoding name. Always `default`.
    pub name: String,
    /// The chunk key encoding configuration.
    pub configuration: ChunkKeyEncodingConfiguration,
}

/// Chunk key encoding configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkKeyEncodingConfiguration {
    /// The separator between chunk indices. Always `/`.
    pub separator: String,
}

impl DatasetMetadata {
    /// Create dataset metadata.
    #[must_use]
    pub fn new(
        shape: ArrayShape,
        data_type: DataType,
        chunk_shape: ArrayShape,
        compression: Compression,
        attributes: Attributes,
    ) -> Self {
        let mut codecs = vec![serde_json::json!({
            "name": "bytes",
            "configuration": {"endian": NATIVE_ENDIAN}
        })];
        if compression != Compression::None {
            codecs.push(serde_json::to_value(compression).unwrap_or_default());
        }
        Self {
            zarr_format: 3,
            node_type: "array".to_string(),
            shape,
            data_type,
            chunk_grid: ChunkGridMetadata {
                name: "regular".to_string(),
                configuration: ChunkGridConfiguration { chunk_shape },
            },
            chunk_key_encoding: ChunkKeyEncodingMetadata {
                name: "default".to_string(),
                configuration: ChunkKeyEncodingConfiguration {
                    separator: "/".to_string(),
                },
            },
            fill_value: serde_json::Value::from(0),
            codecs,
            attributes,
        }
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_grid.configuration.chunk_shape
    }

    /// Validate the metadata and return the compression it describes.
    ///
    /// # Errors
    /// Returns [`DatasetCreateError::UnsupportedMetadata`] if the metadata describes a dataset this crate cannot read.
    pub fn validate(&self) -> Result<Compression, DatasetCreateError> {
        let unsupported = |reason: String| Err(DatasetCreateError::UnsupportedMetadata(reason));
        if self.zarr_format != 3 || self.node_type != "array" {
            return unsupported(format!(
                "zarr_format {} node_type {}",
                self.zarr_format, self.node_type
            ));
        }
        if self.chunk_grid.name != "regular"
            || self.chunk_shape().len() != self.shape.len()
            || self.chunk_shape().contains(&0)
        {
            return unsupported(format!("chunk grid {:?}", self.chunk_grid));
        }
        if self.chunk_key_encoding.name != "default"
            || self.chunk_key_encoding.configuration.separator != "/"
        {
            return unsupported(format!("chunk key encoding {:?}", self.chunk_key_encoding));
        }
        if self.fill_value.as_f64() != Some(0.0) {
            return unsupported(format!("fill value {}", self.fill_value));
        }
        let mut codecs = self.codecs.iter();
        let endian = codecs.next().and_then(|bytes| {
            (bytes["name"] == "bytes").then(|| bytes["configuration"]["endian"].as_str())
        });
        match endian.flatten() {
            Some(endian) if endian == NATIVE_ENDIAN => {}
            _ => return unsupported(format!("codecs {:?}", self.codecs)),
        }
        let compression = match codecs.next() {
            Some(codec) => serde_json::from_value(codec.clone())
                .map_err(|err| DatasetCreateError::UnsupportedMetadata(err.to_string()))?,
            None => Compression::None,
        };
        if codecs.next().is_some() {
            return unsupported(format!("codecs {:?}", self.codecs));
        }
        Ok(compression)
    }
}
