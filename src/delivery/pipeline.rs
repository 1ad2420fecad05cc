use crate::delivery::artifact::normalize_filename;
use crate::delivery::{Artifact, ConversionError, FormatPolicy, OutputFormat, Renderer};
use crate::source::Document;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder, TempDir};

/// Converted outputs of one document
#[derive(Debug, Default)]
pub struct Conversion {
    /// Successful outputs in policy order
    pub artifacts: Vec<Artifact>,
    /// Formats that failed without failing the whole call
    pub failures: Vec<(OutputFormat, ConversionError)>,
}

/// Turns documents into artifacts according to a [`FormatPolicy`]
///
/// Artifacts are written into `working_dir` and left there for the sinks;
/// intermediate files live in a scratch directory removed after each call.
pub struct DeliveryPipeline {
    working_dir: PathBuf,
    renderers: HashMap<OutputFormat, Arc<dyn Renderer>>,
}

impl DeliveryPipeline {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            renderers: HashMap::new(),
        }
    }

    /// Registers the renderer used for `format`
    pub fn with_renderer(mut self, format: OutputFormat, renderer: Arc<dyn Renderer>) -> Self {
        self.renderers.insert(format, renderer);
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn has_renderer(&self, format: OutputFormat) -> bool {
        self.renderers.contains_key(&format)
    }

    /// Converts `document` into the artifacts `policy` asks for
    ///
    /// # Returns
    ///
    /// * `Ok(Conversion)` - At least one artifact; under `All`, formats that
    ///   failed are listed in `failures`
    /// * `Err(ConversionError)` - A single requested format failed, or every
    ///   format failed under `All`
    pub async fn convert(
        &self,
        document: &Document,
        policy: FormatPolicy,
    ) -> Result<Conversion, ConversionError> {
        tokio::fs::create_dir_all(&self.working_dir).await?;
        let display_name = normalize_filename(&document.file_stem);

        if policy == FormatPolicy::PassThrough {
            let artifact = self.pass_through(document, &display_name).await?;
            return Ok(Conversion {
                artifacts: vec![artifact],
                failures: Vec::new(),
            });
        }

        let scratch = Builder::new().prefix("concierge-").tempdir_in(&self.working_dir)?;
        let source = write_source(document, &scratch).await?;

        let mut conversion = Conversion::default();
        for &format in policy.formats() {
            match self.render_one(document, &source, format, &display_name).await {
                Ok(artifact) => conversion.artifacts.push(artifact),
                Err(e) if policy.allows_partial() => {
                    tracing::warn!("Format {} failed for {}: {}", format, document.id, e);
                    conversion.failures.push((format, e));
                }
                Err(e) => return Err(e),
            }
        }

        if conversion.artifacts.is_empty() {
            return Err(ConversionError::AllFormatsFailed(document.id.to_string()));
        }
        Ok(conversion)
    }

    /// Delivers the original payload, or the HTML rendering of a text document
    async fn pass_through(
        &self,
        document: &Document,
        display_name: &str,
    ) -> Result<Artifact, ConversionError> {
        let (bytes, extension) = match &document.original {
            Some(attachment) => (attachment.bytes.clone(), attachment.extension.clone()),
            None => (
                render_html(document, None).into_bytes(),
                ".html".to_string(),
            ),
        };

        let path = Builder::new()
            .prefix("original-")
            .suffix(&extension)
            .tempfile_in(&self.working_dir)?
            .into_temp_path();
        tokio::fs::write(&path, &bytes).await?;
        let path = path.keep().map_err(|e| ConversionError::Io(e.error))?;

        Ok(self.artifact(document, path, display_name, extension, OutputFormat::Original))
    }

    async fn render_one(
        &self,
        document: &Document,
        source: &Path,
        format: OutputFormat,
        display_name: &str,
    ) -> Result<Artifact, ConversionError> {
        let renderer = self
            .renderers
            .get(&format)
            .ok_or(ConversionError::NoRenderer(format))?;

        let output = Builder::new()
            .prefix(&format!("{}-", format.as_str()))
            .suffix(".pdf")
            .tempfile_in(&self.working_dir)?
            .into_temp_path();

        // Dropping `output` on failure removes the partial file.
        renderer.render(source, format, &output).await?;
        let path = output.keep().map_err(|e| ConversionError::Io(e.error))?;

        let name = format!("{}{}", display_name, format.name_suffix());
        Ok(self.artifact(document, path, &name, ".pdf".to_string(), format))
    }

    fn artifact(
        &self,
        document: &Document,
        path: PathBuf,
        display_name: &str,
        extension: String,
        format: OutputFormat,
    ) -> Artifact {
        Artifact {
            path,
            kind: document.category,
            category: document.collection.clone(),
            display_name: display_name.to_string(),
            extension,
            format,
        }
    }
}

/// Writes the renderer input into `scratch` and returns its path
///
/// Documents with an original attachment are rendered from it; text
/// documents go through an HTML intermediate with the illustration saved
/// next to it.
async fn write_source(document: &Document, scratch: &TempDir) -> Result<PathBuf, ConversionError> {
    if let Some(attachment) = &document.original {
        let path = scratch.path().join(format!("source{}", attachment.extension));
        tokio::fs::write(&path, &attachment.bytes).await?;
        return Ok(path);
    }

    let image = match &document.illustration {
        Some(illustration) => {
            let name = format!("illustration{}", illustration.extension);
            tokio::fs::write(scratch.path().join(&name), &illustration.bytes).await?;
            Some(name)
        }
        None => None,
    };

    let path = scratch.path().join("source.html");
    tokio::fs::write(&path, render_html(document, image.as_deref())).await?;
    Ok(path)
}

/// Standalone HTML page for a text document
///
/// `image` is the illustration's file name relative to the page.
pub(crate) fn render_html(document: &Document, image: Option<&str>) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n");
    html.push_str(&format!(
        "<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n",
        escape_html(document.lang.as_deref().unwrap_or("en")),
        escape_html(&document.title)
    ));
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(&document.title)));
    html.push_str(&format!(
        "<p class=\"meta\">{} &middot; {}</p>\n",
        document.date.format("%Y-%m-%d"),
        escape_html(document.id.as_str())
    ));

    if let Some(illustration) = &document.illustration {
        html.push_str("<figure>\n");
        if let Some(image) = image {
            html.push_str(&format!("<img src=\"{}\" alt=\"\">\n", escape_html(image)));
        }
        html.push_str(&format!(
            "<figcaption>{}</figcaption>\n</figure>\n",
            escape_html(&illustration.caption)
        ));
    }

    for paragraph in &document.body {
        html.push_str(&format!("<p>{}</p>\n", escape_html(paragraph)));
    }

    if let Some(url) = &document.reference_url {
        html.push_str(&format!(
            "<p class=\"source\"><a href=\"{0}\">{0}</a></p>\n",
            escape_html(url)
        ));
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
