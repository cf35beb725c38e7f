//! Frozen weights and SafeTensors I/O

use ndarray::{Array2, ArrayView2};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use super::ModelError;
use crate::quant::{
    bf16_to_f32, dequantize_4bit, quantize_4bit, round_bf16, ComputeDtype, Quantized4Bit,
    QuantizationConfig,
};

/// A frozen `[rows, cols]` matrix, dense or 4-bit
#[derive(Debug, Clone)]
pub enum FrozenWeight {
    Dense(Array2<f32>),
    Quantized { packed: Quantized4Bit, rows: usize, cols: usize },
}

impl FrozenWeight {
    /// Store `weight` the way `quantization` asks
    pub fn from_dense(weight: Array2<f32>, quantization: &QuantizationConfig) -> Self {
        if quantization.load_in_4bit {
            let (rows, cols) = weight.dim();
            let values: Vec<f32> = weight.iter().copied().collect();
            let packed = quantize_4bit(&values, quantization.quant_type, quantization.double_quant);
            Self::Quantized { packed, rows, cols }
        } else {
            Self::Dense(to_compute_dtype(weight, quantization.compute_dtype))
        }
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Dense(w) => w.dim(),
            Self::Quantized { rows, cols, .. } => (*rows, *cols),
        }
    }

    #[must_use]
    pub fn is_quantized(&self) -> bool {
        matches!(self, Self::Quantized { .. })
    }

    /// Dense view, dequantizing on the fly
    pub fn to_dense(&self) -> Cow<'_, Array2<f32>> {
        match self {
            Self::Dense(w) => Cow::Borrowed(w),
            Self::Quantized { packed, rows, cols } => {
                let values = dequantize_4bit(packed);
                let cols = *cols;
                Cow::Owned(Array2::from_shape_fn((*rows, cols), |(i, j)| values[i * cols + j]))
            }
        }
    }

    /// `x · Wᵀ` for row inputs `x: [T, cols]`
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        x.dot(&self.to_dense().t())
    }

    /// Gradient w.r.t. the input: `g · W` for `g: [T, rows]`
    pub fn backward_input(&self, g: ArrayView2<'_, f32>) -> Array2<f32> {
        g.dot(&*self.to_dense())
    }

    /// Bytes held by the weight
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        match self {
            Self::Dense(w) => w.len() * 4,
            Self::Quantized { packed, .. } => packed.memory_bytes(),
        }
    }

    #[must_use]
    pub fn num_elements(&self) -> usize {
        let (r, c) = self.shape();
        r * c
    }
}

/// Round to the compute dtype
pub fn to_compute_dtype(mut weight: Array2<f32>, dtype: ComputeDtype) -> Array2<f32> {
    if dtype == ComputeDtype::Bf16 {
        weight.mapv_inplace(round_bf16);
    }
    weight
}

/// Tensors keyed by name, as `(shape, row-major values)`
pub type TensorMap = HashMap<String, (Vec<usize>, Vec<f32>)>;

/// Read every F32/BF16 tensor of a SafeTensors file
pub fn read_safetensors(path: &Path) -> Result<TensorMap, ModelError> {
    let data = fs::read(path).map_err(|e| ModelError::io(path, e))?;
    let tensors = SafeTensors::deserialize(&data).map_err(|e| {
        ModelError::SafeTensors(format!("Failed to parse {}: {e}", path.display()))
    })?;

    let mut out = HashMap::new();
    for name in tensors.names() {
        let view = tensors
            .tensor(name)
            .map_err(|e| ModelError::SafeTensors(format!("{name}: {e}")))?;
        let bytes = view.data();
        let values: Vec<f32> = match view.dtype() {
            Dtype::F32 => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Dtype::BF16 => bytes
                .chunks_exact(2)
                .map(|c| bf16_to_f32(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            other => {
                return Err(ModelError::UnsupportedDtype {
                    name: name.to_string(),
                    dtype: format!("{other:?}"),
                })
            }
        };
        out.insert(name.to_string(), (view.shape().to_vec(), values));
    }
    Ok(out)
}

/// Write F32 matrices to a SafeTensors file
pub fn write_safetensors(
    path: &Path,
    tensors: &[(String, Array2<f32>)],
    metadata: BTreeMap<String, String>,
) -> Result<(), ModelError> {
    let buffers: Vec<(&str, Vec<usize>, Vec<f32>)> = tensors
        .iter()
        .map(|(name, w)| (name.as_str(), w.shape().to_vec(), w.iter().copied().collect()))
        .collect();

    let views = buffers
        .iter()
        .map(|(name, shape, values)| {
            TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(values))
                .map(|view| (*name, view))
                .map_err(|e| ModelError::SafeTensors(format!("{name}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bytes = safetensors::serialize(views, Some(metadata.into_iter().collect()))
        .map_err(|e| ModelError::SafeTensors(format!("SafeTensors serialization failed: {e}")))?;
    fs::write(path, bytes).map_err(|e| ModelError::io(path, e))
}

/// Take a `[rows, cols]` matrix out of a tensor map
pub fn take_matrix(
    tensors: &mut TensorMap,
    name: &str,
    rows: usize,
    cols: usize,
) -> Result<Array2<f32>, ModelError> {
    let (shape, values) =
        tensors.remove(name).ok_or_else(|| ModelError::MissingTensor(name.to_string()))?;
    if shape != [rows, cols] {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            expected: vec![rows, cols],
            actual: shape,
        });
    }
    Array2::from_shape_vec((rows, cols), values).map_err(|e| ModelError::ShapeMismatch {
        name: format!("{name} ({e})"),
        expected: vec![rows, cols],
        actual: shape,
    })
}
