//! Label printing through the DYMO Connect web service.
//!
//! Templates are `.label` XML files exported from DYMO Connect with fixed
//! placeholder text (`TICKETNO`, `SERIALNO`, `OPENDATE`, `00.00`). The
//! filled template is posted to the local web service. After a successful
//! print the service renders the same label to PNG, which is written to the
//! preview directory so the admin interface can show the last label.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use tokio::sync::Mutex;

use super::{LabelJob, LabelPrinter};
use crate::config::Config;
use crate::error::AutoprintError;

/// File name of the last printed label inside the preview directory.
pub const PREVIEW_FILE: &str = "last_label.png";

const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Label printer driven by the DYMO Connect web service.
pub struct DymoLabelPrinter {
    http: Client,
    service_url: String,
    printer_name: String,
    template_dir: PathBuf,
    preview_dir: PathBuf,
    /// One job at a time on the device.
    device: Mutex<()>,
}

impl DymoLabelPrinter {
    /// Creates the printer from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AutoprintError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(config: &Config) -> Result<Self, AutoprintError> {
        // DYMO Connect serves https on localhost with a self-signed certificate.
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(AutoprintError::HttpClient)?;

        Ok(Self {
            http,
            service_url: config.dymo_service_url.clone(),
            printer_name: config.dymo_printer_name.clone(),
            template_dir: config.template_dir.clone(),
            preview_dir: config.preview_dir.clone(),
            device: Mutex::new(()),
        })
    }

    /// Reads the template for `job` and fills in its fields.
    pub async fn render(template_dir: &Path, job: &LabelJob) -> Result<String, AutoprintError> {
        let path = template_dir.join(job.template_name());
        let template =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| AutoprintError::Template {
                    path: path.display().to_string(),
                    source,
                })?;

        Ok(fill_template(&template, &job.fields()))
    }

    fn print_params(copies: u32) -> String {
        format!(
            "<LabelWriterPrintParams><Copies>{}</Copies></LabelWriterPrintParams>",
            copies.max(1)
        )
    }

    fn render_params() -> &'static str {
        "<LabelRenderParams><LabelColor>Black</LabelColor></LabelRenderParams>"
    }

    /// Asks the service for a PNG of `label_xml`.
    ///
    /// The service answers with a JSON string holding base64 image data.
    async fn render_image(&self, label_xml: &str) -> Result<Vec<u8>, AutoprintError> {
        let form = [
            ("printerName", self.printer_name.as_str()),
            ("renderParamsXml", Self::render_params()),
            ("labelXml", label_xml),
            ("labelSetXml", ""),
        ];

        let response = self
            .http
            .post(format!("{}/RenderLabel", self.service_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| AutoprintError::print("label preview", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AutoprintError::print(
                "label preview",
                format!("DYMO service returned {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AutoprintError::print("label preview", e.to_string()))?;
        decode_image(&body)
    }

    async fn save_preview(&self, label_xml: &str) {
        let path = self.preview_dir.join(PREVIEW_FILE);
        let image = match self.render_image(label_xml).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "Could not render label preview");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&path, image).await {
            tracing::warn!(path = %path.display(), error = %e, "Could not save label preview");
        }
    }
}

/// Decodes a render response: a JSON string or bare base64, possibly a data URL.
fn decode_image(body: &str) -> Result<Vec<u8>, AutoprintError> {
    let body = body.trim();
    let encoded = match serde_json::from_str::<String>(body) {
        Ok(s) => s,
        Err(_) => body.to_string(),
    };
    let encoded = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded.as_str(),
    };
    BASE64
        .decode(encoded.trim())
        .map_err(|e| AutoprintError::print("label preview", format!("invalid image data: {}", e)))
}

/// Replaces the first occurrence of each placeholder, in order.
fn fill_template(template: &str, fields: &[(&'static str, String)]) -> String {
    fields
        .iter()
        .fold(template.to_string(), |label, (placeholder, value)| {
            label.replacen(placeholder, &xml_escape(value), 1)
        })
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl LabelPrinter for DymoLabelPrinter {
    async fn print_label(&self, job: &LabelJob) -> Result<(), AutoprintError> {
        let label_xml = Self::render(&self.template_dir, job).await?;

        let _device = self.device.lock().await;

        let form = [
            ("printerName", self.printer_name.clone()),
            ("printParamsXml", Self::print_params(job.copies())),
            ("labelXml", label_xml.clone()),
            ("labelSetXml", String::new()),
        ];

        let response = self
            .http
            .post(format!("{}/PrintLabel", self.service_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| AutoprintError::print("label", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AutoprintError::print(
                "label",
                format!("DYMO service returned {}: {}", status, body.trim()),
            ));
        }

        tracing::info!(template = job.template_name(), copies = job.copies(), "Label printed");

        self.save_preview(&label_xml).await;
        Ok(())
    }
}
