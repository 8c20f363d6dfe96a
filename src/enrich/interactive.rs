use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Enricher, Enrichment};
use crate::model::{
    cap_chars, ExtractedEndpoint, ParamLocation, ParamSource, ParamType, ParameterDescriptor,
    ParameterSet, ResponseHint, DESCRIPTION_LIMIT,
};

/// Labels that name UI controls or standard headers, never API parameters.
const BLACKLIST: &[&str] = &[
    "app",
    "x-rapidapi-key",
    "x-rapidapi-host",
    "request url",
    "target",
    "client",
    "search endpoints",
    "search",
    "get",
    "post",
    "put",
    "patch",
    "delete",
    "feat",
    "custom",
    "g-recaptcha",
    "recaptcha",
    "content-type",
    "content type",
    "accept",
    "user-agent",
    "authorization",
    "cookie",
    "referer",
    "origin",
    "host",
];

static ACTIVE_PANEL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-state="active"][role="tabpanel"]"#).unwrap());
static ACTIVE_ANY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-state="active"]:not([role="tab"])"#).unwrap());
static TAB_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"[role="tab"]"#).unwrap());
static LABEL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label[aria-label]").unwrap());
static INPUT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input").unwrap());
static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static DIV_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());
static MARKDOWN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[class*="markdown"]"#).unwrap());
static CODE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("pre, code").unwrap());
static VALUE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, select, .single-value").unwrap());
static CURL_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)--data(?:-raw)?\s+'(.+?)'").unwrap());

/// Detail-view tabs, in the order they are activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    App,
    Params,
    Headers,
    Body,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::App, Tab::Params, Tab::Headers, Tab::Body];

    pub fn label(self) -> &'static str {
        match self {
            Tab::App => "App",
            Tab::Params => "Params",
            Tab::Headers => "Headers",
            Tab::Body => "Body",
        }
    }
}

/// A live rendering of a detail view that can switch tabs.
///
/// Tab content is rendered lazily, so a tab must be selected before its
/// panel shows up in `page_source`.
#[allow(async_fn_in_trait)]
pub trait DetailDriver {
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Activate the visible tab carrying `label`. `false` when there is none.
    async fn select_tab(&mut self, label: &str) -> Result<bool>;

    async fn page_source(&mut self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Reads parameters off the rendered parameter list, tab by tab.
pub struct InteractiveEnricher<D> {
    driver: D,
}

impl<D> InteractiveEnricher<D> {
    pub fn new(driver: D) -> Self {
        InteractiveEnricher { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: DetailDriver> Enricher for InteractiveEnricher<D> {
    fn name(&self) -> &'static str {
        "interactive"
    }

    async fn enrich(&mut self, endpoint: &ExtractedEndpoint, detail_url: &str) -> Result<Enrichment> {
        self.driver.open(detail_url).await?;

        let mut parameters = ParameterSet::default();
        for tab in Tab::ALL {
            if !self.driver.select_tab(tab.label()).await? {
                debug!(endpoint_id = %endpoint.id, tab = tab.label(), "tab not shown");
                continue;
            }
            let html = self.driver.page_source().await?;
            read_tab(tab, &html, &mut parameters);
        }

        // Schema inference from example payloads is not attempted.
        Ok(Enrichment {
            parameters,
            responses: Some(ResponseHint::generic_object()),
        })
    }

    async fn finish(&mut self) {
        if let Err(e) = self.driver.close().await {
            warn!("failed to close browser session: {:#}", e);
        }
    }
}

/// Fold what the active panel of `tab` shows into `params`.
pub fn read_tab(tab: Tab, html: &str, params: &mut ParameterSet) {
    let doc = Html::parse_document(html);
    if tab == Tab::Body && tab_disabled(&doc, Tab::Body.label()) {
        return;
    }
    let Some(panel) = active_panel(&doc) else {
        return;
    };
    if text_of(panel).contains("No additional") {
        return;
    }

    match tab {
        Tab::App => {
            for (k, v) in app_config(panel) {
                params.app.entry(k).or_insert(v);
            }
        }
        Tab::Params => {
            for p in parameter_rows(panel, ParamLocation::Query) {
                params.push(p);
            }
        }
        Tab::Headers => {
            for p in parameter_rows(panel, ParamLocation::Header) {
                params.push(p);
            }
        }
        Tab::Body => {
            if params.body.is_none() {
                params.body = body_payload(&doc, panel);
            }
        }
    }
}

fn active_panel(doc: &Html) -> Option<ElementRef<'_>> {
    doc.select(&ACTIVE_PANEL_SEL)
        .next()
        .or_else(|| doc.select(&ACTIVE_ANY_SEL).next())
}

fn tab_disabled(doc: &Html, label: &str) -> bool {
    doc.select(&TAB_SEL)
        .filter(|t| text_of(*t) == label)
        .any(|t| t.value().attr("data-disabled") == Some("true") || t.value().attr("disabled").is_some())
}

fn parameter_rows(panel: ElementRef<'_>, location: ParamLocation) -> Vec<ParameterDescriptor> {
    panel
        .select(&LABEL_SEL)
        .filter_map(|label| parameter_row(label, location))
        .collect()
}

fn parameter_row(label: ElementRef<'_>, location: ParamLocation) -> Option<ParameterDescriptor> {
    let name = label.value().attr("aria-label")?.trim();
    if !is_parameter_name(name) {
        return None;
    }
    if parent_element(label).is_some_and(|p| class_contains(p, "invisible")) {
        return None;
    }

    let row = row_container(label);
    let required = if row.select(&SPAN_SEL).any(|s| has_class(s, "text-red-500")) {
        true
    } else {
        !row
            .select(&SPAN_SEL)
            .any(|s| text_of(s).to_lowercase().contains("optional"))
    };

    let input = row.select(&INPUT_SEL).next();
    let input_type = input.and_then(|i| i.value().attr("type"));
    let value = input
        .and_then(|i| i.value().attr("value"))
        .map(str::trim)
        .unwrap_or_default();

    let declared = row
        .select(&SPAN_SEL)
        .find(|s| has_class(*s, "text-[10px]") && has_class(*s, "text-gray-900"))
        .map(text_of)
        .filter(|t| !t.is_empty());
    let param_type = match (declared, input_type) {
        (Some(tag), _) => ParamType::from_label(&tag),
        (None, Some("number")) if value.contains('.') => ParamType::Number,
        (None, Some("number")) => ParamType::Integer,
        (None, Some("checkbox")) => ParamType::Boolean,
        _ => ParamType::String,
    };

    let mut param = ParameterDescriptor::new(name, location, param_type, ParamSource::Rendered);
    param.required = required;
    param.description = row
        .select(&MARKDOWN_SEL)
        .next()
        .map(text_of)
        .filter(|d| !d.is_empty())
        .map(|d| cap_chars(&d, DESCRIPTION_LIMIT))
        .unwrap_or_else(|| {
            if value.is_empty() {
                String::new()
            } else {
                format!("Example value: {}", value)
            }
        });
    param.default = row
        .select(&DIV_SEL)
        .filter(|d| class_contains(*d, "text-gray-500"))
        .map(text_of)
        .find_map(|t| t.split_once("Default:").map(|(_, v)| v.trim().to_string()))
        .filter(|v| !v.is_empty())
        .map(Value::String);
    param.example = match input_type {
        Some("checkbox") => input.map(|i| Value::Bool(i.value().attr("checked").is_some())),
        _ if !value.is_empty() => Some(Value::String(value.to_string())),
        _ => None,
    };

    Some(param)
}

fn is_parameter_name(name: &str) -> bool {
    let len = name.chars().count();
    (2..=50).contains(&len) && !BLACKLIST.contains(&name.to_lowercase().as_str())
}

/// Label -> shown value for the global app settings panel. Key material is skipped.
fn app_config(panel: ElementRef<'_>) -> BTreeMap<String, String> {
    let mut config = BTreeMap::new();
    for label in panel.select(&LABEL_SEL) {
        let Some(name) = label.value().attr("aria-label").map(str::trim) else {
            continue;
        };
        let lower = name.to_lowercase();
        if name.is_empty() || lower == "app" || lower.contains("key") {
            continue;
        }
        let row = row_container(label);
        let value = row.select(&VALUE_SEL).next().map(|field| {
            field
                .value()
                .attr("value")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| text_of(field))
        });
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            config.insert(name.to_string(), value);
        }
    }
    config
}

/// Example body: the `--data` of a displayed curl sample, else the panel's first code block.
fn body_payload(doc: &Html, panel: ElementRef<'_>) -> Option<Value> {
    let from_curl = doc
        .select(&CODE_SEL)
        .map(text_of_raw)
        .filter(|t| t.contains("curl") && t.contains("--data"))
        .find_map(|t| {
            let caps = CURL_DATA_RE.captures(&t)?;
            serde_json::from_str::<Value>(&caps[1]).ok()
        });
    if from_curl.is_some() {
        return from_curl;
    }

    let text = panel
        .select(&CODE_SEL)
        .map(text_of_raw)
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())?;
    Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Nearest enclosing `div` laid out as a column; falls back to the parent.
fn row_container(label: ElementRef<'_>) -> ElementRef<'_> {
    label
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "div" && class_contains(*e, "flex-col"))
        .or_else(|| parent_element(label))
        .unwrap_or(label)
}

fn parent_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.parent().and_then(ElementRef::wrap)
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn class_contains(el: ElementRef<'_>, fragment: &str) -> bool {
    el.value()
        .attr("class")
        .is_some_and(|c| c.contains(fragment))
}

fn text_of(el: ElementRef<'_>) -> String {
    text_of_raw(el).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_of_raw(el: ElementRef<'_>) -> String {
    el.text().collect()
}
