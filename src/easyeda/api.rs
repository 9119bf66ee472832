use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::easyeda::models::{
    ApiResponse, ComponentData, FootprintData, Model3dInfo, ModelData, Part, SymbolData,
};
use crate::error::{EasyedaError, Result};

pub const DEFAULT_API_BASE: &str = "https://easyeda.com";
pub const DEFAULT_MODELS_BASE: &str = "https://modules.easyeda.com";
const API_VERSION: &str = "6.4.19.5";
const STEP_PATH: &str = "qAxj6KHrDKw4blvCG8QJPs7Y";

/// Anything that can hand out raw catalog data. The import pipeline only
/// talks to this trait, so tests can feed it canned components.
pub trait ComponentSource: Send + Sync {
    fn fetch(&self, lcsc_id: &str) -> impl Future<Output = Result<ComponentData>> + Send;

    fn fetch_model(&self, uuid: &str) -> impl Future<Output = Result<ModelData>> + Send;
}

#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub api_base: String,
    pub models_base: String,
    pub min_request_interval: Duration,
    pub timeout: Duration,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            models_base: DEFAULT_MODELS_BASE.to_string(),
            min_request_interval: Duration::from_millis(600),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct EasyedaApi {
    client: Client,
    options: ApiOptions,
    last_request: Mutex<Option<Instant>>,
}

/// Normalizes user input such as `lcsc c2040` or `2040` to `C2040`.
pub fn normalize_lcsc_id(raw: &str) -> std::result::Result<String, EasyedaError> {
    let mut id = raw.trim().to_uppercase();
    if let Some(rest) = id.strip_prefix("LCSC") {
        id = rest.trim().to_string();
    }
    if !id.starts_with('C') {
        id.insert(0, 'C');
    }
    if id.len() < 2 || !id[1..].chars().all(|c| c.is_ascii_digit()) {
        return Err(EasyedaError::InvalidLcscId(raw.to_string()));
    }
    Ok(id)
}

impl EasyedaApi {
    pub fn new() -> Result<Self> {
        Self::with_options(ApiOptions::default())
    }

    pub fn with_options(options: ApiOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("lcsc-grabber/", env!("CARGO_PKG_VERSION")))
            .timeout(options.timeout)
            .build()
            .map_err(EasyedaError::ApiRequest)?;

        Ok(Self {
            client,
            options,
            last_request: Mutex::new(None),
        })
    }

    /// Keeps consecutive requests at least `min_request_interval` apart.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.options.min_request_interval {
                tokio::time::sleep(self.options.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get_component_data(&self, lcsc_id: &str) -> Result<ComponentData> {
        let lcsc_id = normalize_lcsc_id(lcsc_id)?;
        let url = format!(
            "{}/api/products/{}/components?version={}",
            self.options.api_base, lcsc_id, API_VERSION
        );

        log::info!("Fetching component data for {}", lcsc_id);
        self.rate_limit().await;

        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(EasyedaError::ApiRequest)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(EasyedaError::Status { url, status: status.as_u16() }.into());
        }
        if !status.is_success() {
            return Err(EasyedaError::NotFound(lcsc_id).into());
        }

        let body = response.text().await.map_err(EasyedaError::ApiRequest)?;
        let api_response: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| EasyedaError::InvalidData(format!("Failed to parse JSON: {}", e)))?;

        if !api_response.success {
            log::warn!(
                "API error for {}: {}",
                lcsc_id,
                api_response.message.as_deref().unwrap_or("unknown error")
            );
            return Err(EasyedaError::NotFound(lcsc_id).into());
        }

        let result = api_response.result
            .ok_or_else(|| EasyedaError::NotFound(lcsc_id.clone()))?;

        let data_str = result.data_str.map(decode_embedded).unwrap_or(Value::Null);
        let head = data_str.get("head").cloned().unwrap_or(Value::Null);
        let c_para = head.get("c_para").cloned().unwrap_or(Value::Null);

        let symbol_shapes = shape_strings(&data_str);
        let doc_type = head.get("docType").map(value_to_string).unwrap_or_default();
        let has_pins = symbol_shapes.iter().any(|s| s.starts_with("P~"));

        let symbol = if doc_type == "2" || has_pins {
            Part::Present(SymbolData {
                origin_x: number(&head, "x"),
                origin_y: number(&head, "y"),
                prefix: c_para.get("pre").and_then(|v| v.as_str()).map(|s| s.to_string()),
                shapes: symbol_shapes,
            })
        } else {
            Part::Absent
        };

        let footprint = match result.package_detail {
            Some(pkg) => {
                let pkg_data = pkg.get("dataStr").cloned().map(decode_embedded).unwrap_or(Value::Null);
                let pkg_head = pkg_data.get("head").cloned().unwrap_or(Value::Null);
                let shapes = shape_strings(&pkg_data);
                if shapes.is_empty() {
                    Part::Absent
                } else {
                    let title = pkg.get("title")
                        .and_then(|v| v.as_str())
                        .or_else(|| pkg_head.get("c_para").and_then(|cp| cp.get("package")).and_then(|v| v.as_str()))
                        .unwrap_or("")
                        .to_string();
                    log::debug!("Package {} has {} shapes", title, shapes.len());
                    Part::Present(FootprintData {
                        title,
                        origin_x: number(&pkg_head, "x"),
                        origin_y: number(&pkg_head, "y"),
                        shapes,
                    })
                }
            }
            None => Part::Absent,
        };

        let model_3d: Part<Model3dInfo> = match &footprint {
            Part::Present(fp) => Self::extract_3d_model_from_svgnode(&fp.shapes),
            Part::Absent => None,
        }
        .or_else(|| match &symbol {
            Part::Present(sym) => Self::extract_3d_model_from_svgnode(&sym.shapes),
            Part::Absent => None,
        })
        .into();

        let title = result.title
            .ok_or_else(|| EasyedaError::InvalidData("Missing title field".to_string()))?;

        let manufacturer = c_para.get("BOM_Manufacturer")
            .or_else(|| c_para.get("Manufacturer"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let datasheet = result.lcsc.as_ref()
            .and_then(|lcsc| lcsc.get("url"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let jlc_id = c_para.get("BOM_JLCPCB Part Class")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let component = ComponentData {
            lcsc_id,
            title,
            description: result.description.unwrap_or_default(),
            manufacturer,
            datasheet,
            jlc_id,
            symbol,
            footprint,
            model_3d,
        };

        log::info!(
            "Parsed {}: symbol={}, footprint={}, 3d={}",
            component.lcsc_id,
            yes_no(component.symbol.is_present()),
            yes_no(component.footprint.is_present()),
            yes_no(component.model_3d.is_present()),
        );

        Ok(component)
    }

    fn extract_3d_model_from_svgnode(shapes: &[String]) -> Option<Model3dInfo> {
        shapes.iter()
            .filter_map(|shape| shape.strip_prefix("SVGNODE~"))
            .filter_map(|json| serde_json::from_str::<Value>(json).ok())
            .find_map(|svg| {
                let attrs = svg.get("attrs")?;
                if attrs.get("c_etype").and_then(|v| v.as_str()) != Some("outline3D") {
                    return None;
                }
                let uuid = attrs.get("uuid")?.as_str()?.to_string();
                let title = attrs.get("title")?.as_str()?.to_string();
                Some(Model3dInfo { uuid, title })
            })
    }

    pub async fn download_3d_obj(&self, uuid: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/3dmodel/{}", self.options.models_base, uuid);
        self.download_with_retry(&url, "OBJ", uuid).await
    }

    pub async fn download_3d_step(&self, uuid: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/{}/{}", self.options.models_base, STEP_PATH, uuid);
        self.download_with_retry(&url, "STEP", uuid).await
    }

    /// Returns `Ok(None)` when the server says the model does not exist.
    async fn download_with_retry(&self, url: &str, model_type: &str, uuid: &str) -> Result<Option<Vec<u8>>> {
        const MAX_RETRIES: u32 = 3;

        let mut attempt = 1;
        loop {
            log::info!("Downloading 3D {} model: {}{}", model_type, uuid,
                if attempt > 1 { format!(" (retry {}/{})", attempt, MAX_RETRIES) } else { String::new() });

            self.rate_limit().await;
            let failure = match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    log::warn!("No {} model published for {}", model_type, uuid);
                    return Ok(None);
                }
                Ok(response) if !response.status().is_success() => EasyedaError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                },
                Ok(response) => match response.bytes().await {
                    Ok(bytes) => return Ok(Some(bytes.to_vec())),
                    Err(e) => {
                        log::warn!("Failed to read {} response body", model_type);
                        EasyedaError::ApiRequest(e)
                    }
                },
                Err(e) => {
                    log::warn!("Failed to download {} model", model_type);
                    EasyedaError::ApiRequest(e)
                }
            };

            if attempt == MAX_RETRIES {
                return Err(failure.into());
            }
            tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            attempt += 1;
        }
    }
}

impl ComponentSource for EasyedaApi {
    async fn fetch(&self, lcsc_id: &str) -> Result<ComponentData> {
        self.get_component_data(lcsc_id).await
    }

    async fn fetch_model(&self, uuid: &str) -> Result<ModelData> {
        let step = self.download_3d_step(uuid).await?;
        let obj = match self.download_3d_obj(uuid).await? {
            Some(bytes) => Some(String::from_utf8(bytes)
                .map_err(|e| EasyedaError::InvalidData(format!("OBJ model is not UTF-8: {}", e)))?),
            None => None,
        };
        Ok(ModelData { step, obj })
    }
}

/// `dataStr` is sometimes an object and sometimes that object serialized as a string.
fn decode_embedded(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::Null),
        other => other,
    }
}

fn shape_strings(data: &Value) -> Vec<String> {
    match data.get("shape") {
        Some(Value::Array(shapes)) => shapes.iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Some(Value::String(joined)) => joined.split("#@$")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn number(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_ids() {
        assert_eq!(normalize_lcsc_id("c2040").unwrap(), "C2040");
        assert_eq!(normalize_lcsc_id(" LCSC C132230 ").unwrap(), "C132230");
        assert_eq!(normalize_lcsc_id("2040").unwrap(), "C2040");
        assert!(normalize_lcsc_id("C").is_err());
        assert!(normalize_lcsc_id("CX12").is_err());
    }

    #[test]
    fn finds_outline3d_node() {
        let shapes = vec![
            "TRACK~1~3~~0 0 1 1~gge1~0".to_string(),
            r#"SVGNODE~{"gId":"g1","nodeName":"g","attrs":{"c_etype":"outline3D","uuid":"abc123","title":"LQFP-64"}}"#.to_string(),
        ];
        let info = EasyedaApi::extract_3d_model_from_svgnode(&shapes).unwrap();
        assert_eq!(info.uuid, "abc123");
        assert_eq!(info.title, "LQFP-64");
    }

    #[test]
    fn shapes_accept_joined_string() {
        let data = serde_json::json!({ "shape": "P~a#@$R~b" });
        assert_eq!(shape_strings(&data), vec!["P~a", "R~b"]);
    }
}
