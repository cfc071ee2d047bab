use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::errors::{Result, SegError};

/// Tuning parameters forwarded to `seg_init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    pub enable_use_gpu: bool,
    pub cpu_thread_num: i32,
    pub gpu_mem_size: i32,
    pub enable_one_dnn: bool,
    pub enable_onnx_runtime: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            enable_use_gpu: false,
            cpu_thread_num: 20,
            gpu_mem_size: 100,
            enable_one_dnn: false,
            enable_onnx_runtime: false,
        }
    }
}

impl ModelOptions {
    /// Reads options from a JSON object.
    ///
    /// Every key is read on its own: a missing key, a value of the wrong type
    /// or an integer that does not fit `i32` leaves that option at its default.
    /// Anything other than an object yields the defaults.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let bool_or = |key: &str, default: bool| {
            value.get(key).and_then(Value::as_bool).unwrap_or(default)
        };
        let int_or = |key: &str, default: i32| {
            value
                .get(key)
                .and_then(Value::as_i64)
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(default)
        };

        Self {
            enable_use_gpu: bool_or("enableUseGpu", defaults.enable_use_gpu),
            cpu_thread_num: int_or("cpuThreadNum", defaults.cpu_thread_num),
            gpu_mem_size: int_or("gpuMemSize", defaults.gpu_mem_size),
            enable_one_dnn: bool_or("enableOneDnn", defaults.enable_one_dnn),
            enable_onnx_runtime: bool_or("enableOnnxRuntime", defaults.enable_onnx_runtime),
        }
    }

    pub fn from_json_str(document: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(document).map_err(|e| SegError::Configuration {
                message: format!("invalid model options document: {e}"),
            })?;
        Ok(Self::from_value(&value))
    }

    /// Compact camelCase JSON, the same keys `from_value` reads.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let document = std::fs::read_to_string(path).map_err(|e| SegError::FileSystem {
            path: path.to_path_buf(),
            operation: "read model options".to_string(),
            source: e,
        })?;
        Self::from_json_str(&document)
    }

    /// `(use_gpu, gpu_mem_mb, cpu_threads, use_onednn, use_onnxruntime)` in
    /// the order `seg_init` takes them after the model directory.
    pub const fn native_args(&self) -> (i32, i32, i32, i32, i32) {
        (
            self.enable_use_gpu as i32,
            self.gpu_mem_size,
            self.cpu_thread_num,
            self.enable_one_dnn as i32,
            self.enable_onnx_runtime as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = ModelOptions::default();
        assert!(!options.enable_use_gpu);
        assert_eq!(options.cpu_thread_num, 20);
        assert_eq!(options.gpu_mem_size, 100);
        assert!(!options.enable_one_dnn);
        assert!(!options.enable_onnx_runtime);
    }

    #[test]
    fn test_recognized_keys() {
        let options = ModelOptions::from_value(&json!({
            "enableUseGpu": true,
            "cpuThreadNum": 4,
            "gpuMemSize": 2048,
            "enableOneDnn": true,
            "enableOnnxRuntime": true,
        }));
        assert_eq!(
            options,
            ModelOptions {
                enable_use_gpu: true,
                cpu_thread_num: 4,
                gpu_mem_size: 2048,
                enable_one_dnn: true,
                enable_onnx_runtime: true,
            }
        );
    }

    #[test]
    fn test_malformed_keys_fall_back_individually() {
        let options = ModelOptions::from_value(&json!({
            "enableUseGpu": "yes",
            "cpuThreadNum": 8,
            "gpuMemSize": 1e12,
            "enableOneDnn": 1,
            "type": "paddleseg",
        }));
        assert!(!options.enable_use_gpu);
        assert_eq!(options.cpu_thread_num, 8);
        assert_eq!(options.gpu_mem_size, 100);
        assert!(!options.enable_one_dnn);
    }

    #[test]
    fn test_out_of_range_integer() {
        let options = ModelOptions::from_value(&json!({ "cpuThreadNum": 5_000_000_000i64 }));
        assert_eq!(options.cpu_thread_num, 20);
    }

    #[test]
    fn test_non_object_document() {
        assert_eq!(ModelOptions::from_value(&json!([1, 2, 3])), ModelOptions::default());
        assert_eq!(ModelOptions::from_value(&Value::Null), ModelOptions::default());
    }

    #[test]
    fn test_broken_document_is_an_error() {
        let result = ModelOptions::from_json_str("{ \"enableUseGpu\": ");
        assert!(matches!(result, Err(SegError::Configuration { .. })));
    }

    #[test]
    fn test_json_keys_read_back() {
        let options = ModelOptions {
            enable_use_gpu: true,
            cpu_thread_num: 3,
            gpu_mem_size: 640,
            enable_one_dnn: true,
            enable_onnx_runtime: false,
        };
        let json = options.to_json();
        assert!(json.contains("\"cpuThreadNum\":3"));
        assert!(json.contains("\"enableOneDnn\":true"));
        assert_eq!(ModelOptions::from_json_str(&json).unwrap(), options);
    }

    #[test]
    fn test_native_args_order() {
        let options = ModelOptions {
            enable_use_gpu: true,
            cpu_thread_num: 6,
            gpu_mem_size: 512,
            enable_one_dnn: false,
            enable_onnx_runtime: true,
        };
        assert_eq!(options.native_args(), (1, 512, 6, 0, 1));
    }
}
