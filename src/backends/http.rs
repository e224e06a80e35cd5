//! JSON-over-HTTP capability clients
//!
//! Each client posts a JSON request to its configured endpoint and decodes a
//! JSON response. Response decoding is lenient where the services are known
//! to be sloppy: confidences may arrive as numbers or numeric strings, boxes
//! as `[x, y, w, h]` arrays or `{x, y, width, height}` objects.

use crate::{
    config::{EndpointConfig, PersonDetectorParams, SegmentationParams, ServiceConfig},
    error::{PersonRemovalError, Result},
    inference::{
        BoxDetections, InpaintRequest, Inpainter, InpainterRegistry, MaskRefiner, PersonDetector,
        RawBox, RawSegment, SegmentationOutput, Segmenter,
    },
    processor::{PipelineServices, ServiceFactory},
    types::{BoundingBox, MaskRef},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Object class requested from the segmentation and detection services
const PERSON_CLASS: &str = "person";

/// Longest response body quoted in error messages
const MAX_ERROR_BODY: usize = 256;

/// One configured remote endpoint
#[derive(Debug, Clone)]
struct Endpoint {
    name: String,
    url: String,
    api_key: Option<String>,
    client: Client,
}

impl Endpoint {
    fn new(name: &str, config: &EndpointConfig, default_timeout: Duration) -> Result<Self> {
        reqwest::Url::parse(&config.url).map_err(|e| {
            PersonRemovalError::invalid_config(format!(
                "Endpoint '{}' has an invalid URL '{}': {}",
                name, config.url, e
            ))
        })?;

        let timeout = config
            .timeout_ms
            .map_or(default_timeout, Duration::from_millis);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PersonRemovalError::network_error("Failed to create HTTP client", &e))?;

        Ok(Self {
            name: name.to_string(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    async fn post_json<Req, Resp>(&self, operation: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        log::debug!("POST {} ({} via '{}')", self.url, operation, self.name);

        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PersonRemovalError::network_error(operation, &e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PersonRemovalError::network_error(operation, &e))?;

        if !status.is_success() {
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(PersonRemovalError::backend_failure(
                &self.name,
                operation,
                &format!("HTTP {}: {}", status, snippet),
            ));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Serialize)]
struct SegmentRequest<'a> {
    image_url: &'a str,
    prompt: &'a str,
    points_per_side: u32,
    pred_iou_thresh: f64,
    stability_score_thresh: f64,
    min_mask_region_area: u32,
}

#[derive(Deserialize)]
struct SegmentResponse {
    #[serde(default, alias = "masks", alias = "instances")]
    segments: Vec<WireRegion>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
}

#[derive(Deserialize)]
struct WireRegion {
    #[serde(default, alias = "box")]
    bbox: Option<Value>,
    #[serde(default, alias = "mask_url", alias = "segmentation")]
    mask: Option<String>,
    #[serde(default, alias = "score")]
    confidence: Option<Value>,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    image_url: &'a str,
    class: &'a str,
    confidence_threshold: f64,
    iou_threshold: f64,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default, alias = "detections")]
    boxes: Vec<WireRegion>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
}

#[derive(Serialize)]
struct RefineRequest<'a> {
    image_url: &'a str,
    #[serde(rename = "box")]
    box_prompt: [f64; 4],
}

#[derive(Deserialize)]
struct RefineResponse {
    #[serde(default, alias = "mask_url", alias = "segmentation")]
    mask: Option<String>,
}

#[derive(Serialize)]
struct WireMaskRegion<'a> {
    mask: &'a str,
    bbox: [f64; 4],
}

#[derive(Serialize)]
struct InpaintWireRequest<'a> {
    image_url: &'a str,
    prompt: &'a str,
    image_width: u32,
    image_height: u32,
    mask_regions: Vec<WireMaskRegion<'a>>,
    /// Dilated fill boxes for services that ignore mask references
    fill_boxes: Vec<[f64; 4]>,
}

#[derive(Deserialize)]
struct InpaintWireResponse {
    #[serde(default, alias = "output_url", alias = "image_url", alias = "url")]
    result_url: Option<String>,
}

fn box_array(bbox: &BoundingBox) -> [f64; 4] {
    [bbox.x, bbox.y, bbox.width, bbox.height]
}

/// Confidence from a number or numeric string
fn parse_confidence(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Box from `[x, y, w, h]` or `{x, y, width, height}`
fn parse_bbox(value: &Value) -> Option<BoundingBox> {
    let [x, y, width, height] = match value {
        Value::Array(items) if items.len() == 4 => {
            let mut coords = [0.0; 4];
            for (slot, item) in coords.iter_mut().zip(items) {
                *slot = item.as_f64()?;
            }
            coords
        },
        Value::Object(fields) => {
            let get = |key: &str| fields.get(key).and_then(Value::as_f64);
            [get("x")?, get("y")?, get("width")?, get("height")?]
        },
        _ => return None,
    };

    [x, y, width, height]
        .iter()
        .all(|v| v.is_finite())
        .then(|| BoundingBox::new(x, y, width, height))
}

fn dimensions(width: Option<u32>, height: Option<u32>) -> Option<(u32, u32)> {
    width.zip(height)
}

impl WireRegion {
    fn confidence(&self) -> Option<f64> {
        self.confidence.as_ref().and_then(parse_confidence)
    }

    fn bbox(&self) -> Option<BoundingBox> {
        self.bbox.as_ref().and_then(parse_bbox)
    }
}

/// Promptable segmentation over HTTP
#[derive(Debug, Clone)]
pub struct HttpSegmenter {
    endpoint: Endpoint,
}

impl HttpSegmenter {
    /// # Errors
    /// - Invalid endpoint URL
    /// - HTTP client construction failure
    pub fn new(config: &EndpointConfig, default_timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("segmenter", config, default_timeout)?,
        })
    }
}

#[async_trait]
impl Segmenter for HttpSegmenter {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn segment(
        &self,
        image_url: &str,
        params: &SegmentationParams,
    ) -> Result<SegmentationOutput> {
        let request = SegmentRequest {
            image_url,
            prompt: PERSON_CLASS,
            points_per_side: params.points_per_side,
            pred_iou_thresh: params.pred_iou_thresh,
            stability_score_thresh: params.stability_score_thresh,
            min_mask_region_area: params.min_mask_region_area,
        };
        let response: SegmentResponse = self.endpoint.post_json("segment", &request).await?;

        let segments = response
            .segments
            .iter()
            .map(|region| RawSegment {
                bbox: region.bbox(),
                mask: region.mask.clone().map(MaskRef::new),
                confidence: region.confidence(),
            })
            .collect();

        Ok(SegmentationOutput {
            segments,
            image_dimensions: dimensions(response.image_width, response.image_height),
        })
    }
}

/// Person bounding-box detector over HTTP
#[derive(Debug, Clone)]
pub struct HttpPersonDetector {
    endpoint: Endpoint,
}

impl HttpPersonDetector {
    /// # Errors
    /// - Invalid endpoint URL
    /// - HTTP client construction failure
    pub fn new(config: &EndpointConfig, default_timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("person-detector", config, default_timeout)?,
        })
    }
}

#[async_trait]
impl PersonDetector for HttpPersonDetector {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn detect_persons(
        &self,
        image_url: &str,
        params: &PersonDetectorParams,
    ) -> Result<BoxDetections> {
        let request = DetectRequest {
            image_url,
            class: &params.class_name,
            confidence_threshold: params.confidence_threshold,
            iou_threshold: params.iou_threshold,
        };
        let response: DetectResponse = self.endpoint.post_json("detect persons", &request).await?;

        let total = response.boxes.len();
        let boxes: Vec<RawBox> = response
            .boxes
            .iter()
            .filter_map(|region| {
                region.bbox().map(|bbox| RawBox {
                    bbox,
                    confidence: region.confidence(),
                })
            })
            .collect();
        if boxes.len() < total {
            log::warn!(
                "Person detector returned {} boxes without usable coordinates",
                total - boxes.len()
            );
        }

        Ok(BoxDetections {
            boxes,
            image_dimensions: dimensions(response.image_width, response.image_height),
        })
    }
}

/// Box-prompted mask refinement over HTTP
#[derive(Debug, Clone)]
pub struct HttpMaskRefiner {
    endpoint: Endpoint,
}

impl HttpMaskRefiner {
    /// # Errors
    /// - Invalid endpoint URL
    /// - HTTP client construction failure
    pub fn new(config: &EndpointConfig, default_timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("refiner", config, default_timeout)?,
        })
    }
}

#[async_trait]
impl MaskRefiner for HttpMaskRefiner {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn refine(&self, image_url: &str, box_prompt: &BoundingBox) -> Result<Option<MaskRef>> {
        let request = RefineRequest {
            image_url,
            box_prompt: box_array(box_prompt),
        };
        let response: RefineResponse = self.endpoint.post_json("refine", &request).await?;
        Ok(response
            .mask
            .filter(|mask| !mask.trim().is_empty())
            .map(MaskRef::new))
    }
}

/// Generative fill over HTTP
#[derive(Debug, Clone)]
pub struct HttpInpainter {
    endpoint: Endpoint,
}

impl HttpInpainter {
    /// # Errors
    /// - Invalid endpoint URL
    /// - HTTP client construction failure
    pub fn new(name: &str, config: &EndpointConfig, default_timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(name, config, default_timeout)?,
        })
    }
}

#[async_trait]
impl Inpainter for HttpInpainter {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn fill(&self, request: InpaintRequest<'_>) -> Result<String> {
        let mask = request.mask;
        let body = InpaintWireRequest {
            image_url: request.image_url,
            prompt: request.prompt,
            image_width: mask.image_width,
            image_height: mask.image_height,
            mask_regions: mask
                .regions
                .regions()
                .map(|region| WireMaskRegion {
                    mask: region.mask.as_str(),
                    bbox: box_array(&region.bbox),
                })
                .collect(),
            fill_boxes: mask.fill_boxes().iter().map(box_array).collect(),
        };

        let response: InpaintWireResponse = self.endpoint.post_json("inpaint", &body).await?;
        response
            .result_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                PersonRemovalError::backend_failure(
                    &self.endpoint.name,
                    "inpaint",
                    "response had no result URL",
                )
            })
    }
}

/// Builds HTTP clients for every endpoint in a [`ServiceConfig`]
#[derive(Debug, Clone)]
pub struct HttpServiceFactory {
    config: ServiceConfig,
    default_timeout: Duration,
}

impl HttpServiceFactory {
    /// `default_timeout` applies to endpoints without their own `timeoutMs`
    #[must_use]
    pub fn new(config: ServiceConfig, default_timeout: Duration) -> Self {
        Self {
            config,
            default_timeout,
        }
    }
}

impl ServiceFactory for HttpServiceFactory {
    fn create_services(&self) -> Result<PipelineServices> {
        self.config.validate()?;

        let segmenter = HttpSegmenter::new(&self.config.segmenter, self.default_timeout)?;
        let mut builder = PipelineServices::builder(Arc::new(segmenter));

        if let (Some(detector), Some(refiner)) =
            (&self.config.person_detector, &self.config.refiner)
        {
            builder = builder.fallback(
                Arc::new(HttpPersonDetector::new(detector, self.default_timeout)?),
                Arc::new(HttpMaskRefiner::new(refiner, self.default_timeout)?),
            );
        }

        let mut registry = InpainterRegistry::new();
        for named in &self.config.inpainters {
            registry.register(Arc::new(HttpInpainter::new(
                &named.name,
                &named.endpoint,
                self.default_timeout,
            )?));
        }

        builder.inpainters(registry).build()
    }

    fn description(&self) -> String {
        format!(
            "HTTP services ({} inpainters, fallback {})",
            self.config.inpainters.len(),
            if self.config.person_detector.is_some() {
                "configured"
            } else {
                "not configured"
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamedEndpoint;
    use serde_json::json;

    fn endpoint(url: &str) -> EndpointConfig {
        EndpointConfig {
            url: url.to_string(),
            api_key: None,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_parse_confidence_variants() {
        assert_eq!(parse_confidence(&json!(0.8)), Some(0.8));
        assert_eq!(parse_confidence(&json!(" 0.65 ")), Some(0.65));
        assert_eq!(parse_confidence(&json!("high")), None);
        assert_eq!(parse_confidence(&json!(null)), None);
    }

    #[test]
    fn test_parse_bbox_variants() {
        let expected = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(parse_bbox(&json!([1, 2, 3, 4])), Some(expected));
        assert_eq!(
            parse_bbox(&json!({"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0})),
            Some(expected)
        );
        assert_eq!(parse_bbox(&json!([1, 2, 3])), None);
        assert_eq!(parse_bbox(&json!({"x": 1.0})), None);
        assert_eq!(parse_bbox(&json!("1,2,3,4")), None);
    }

    #[test]
    fn test_segment_response_tolerates_missing_fields() {
        let response: SegmentResponse = serde_json::from_value(json!({
            "masks": [
                {"box": [0, 0, 10, 20], "mask_url": "https://m/0.png", "score": "0.9"},
                {"mask": "rle:abc"}
            ],
            "image_width": 640
        }))
        .unwrap();

        assert_eq!(response.segments.len(), 2);
        assert_eq!(response.segments[0].confidence(), Some(0.9));
        assert_eq!(response.segments[0].mask.as_deref(), Some("https://m/0.png"));
        assert!(response.segments[1].bbox().is_none());
        assert!(dimensions(response.image_width, response.image_height).is_none());
    }

    #[test]
    fn test_endpoint_rejects_invalid_url() {
        let err = HttpSegmenter::new(&endpoint("not a url"), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, PersonRemovalError::InvalidConfig(_)));
    }

    #[test]
    fn test_factory_wires_every_endpoint() {
        let config = ServiceConfig {
            segmenter: endpoint("https://seg.example.com/v1"),
            person_detector: Some(endpoint("https://det.example.com/v1")),
            refiner: Some(endpoint("https://ref.example.com/v1")),
            inpainters: vec![
                NamedEndpoint {
                    name: "lama".to_string(),
                    endpoint: endpoint("https://lama.example.com"),
                },
                NamedEndpoint {
                    name: "sdxl".to_string(),
                    endpoint: endpoint("https://sdxl.example.com"),
                },
            ],
        };

        let services = HttpServiceFactory::new(config, Duration::from_secs(60))
            .create_services()
            .unwrap();
        assert!(services.has_fallback());
        assert_eq!(services.inpainters().names(), vec!["lama", "sdxl"]);
    }
}
