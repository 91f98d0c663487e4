//! # Directive compiler.
//!
//! Turns ingest directives into [`ProvisioningTemplate`]s.
//!
//! ## Validation order (per directive)
//! ```text
//! enabled?          no  → skipped (not an error)
//! input type        not stream/file     → InputTypeInvalid
//! engine blocks     count != 1          → EngineCountInvalid
//! engine output     empty               → FieldMissing("output")
//! input url         empty               → FieldMissing("input.url")
//! ffmpeg binary     empty               → FieldMissing("ffmpeg")
//! listen endpoint   none                → FieldMissing("listen")
//! ```
//!
//! ## Rules
//! - Errors are isolated per directive; [`compile_vhost`] collects them and
//!   keeps compiling the remaining directives.
//! - Compilation is pure: the same directive always yields an equal template.

use std::path::PathBuf;

use crate::directives::{DirectiveSource, IngestDirective};
use crate::error::ConfigError;
use crate::templates::placeholder::{self, PORT};
use crate::templates::{EngineProfile, ProvisioningTemplate, SourceClass, TemplateKey};

/// Outcome of compiling every directive of one vhost.
#[derive(Debug, Default)]
pub struct CompileReport {
    /// Templates ready to be upserted.
    pub templates: Vec<ProvisioningTemplate>,
    /// Directives rejected with their error.
    pub rejected: Vec<(TemplateKey, ConfigError)>,
}

/// Compiles all ingest directives declared for `vhost`.
pub fn compile_vhost(source: &dyn DirectiveSource, vhost: &str) -> CompileReport {
    let listens = source.listens();
    let mut report = CompileReport::default();

    for ingest in source.ingests(vhost) {
        match compile_ingest(vhost, &ingest, &listens) {
            Ok(Some(template)) => report.templates.push(template),
            Ok(None) => {}
            Err(e) => report
                .rejected
                .push((TemplateKey::new(vhost, ingest.name.clone()), e)),
        }
    }
    report
}

/// Compiles one directive. Returns `Ok(None)` for disabled directives.
pub fn compile_ingest(
    vhost: &str,
    ingest: &IngestDirective,
    listens: &[String],
) -> Result<Option<ProvisioningTemplate>, ConfigError> {
    if !ingest.enabled {
        return Ok(None);
    }

    let input_type = ingest.input.as_ref().map(|i| i.kind.as_str()).unwrap_or("");
    let class = SourceClass::parse(input_type).ok_or_else(|| ConfigError::InputTypeInvalid {
        ingest: ingest.name.clone(),
        input_type: input_type.to_string(),
    })?;

    let [engine] = ingest.engines.as_slice() else {
        return Err(ConfigError::EngineCountInvalid {
            ingest: ingest.name.clone(),
            count: ingest.engines.len(),
        });
    };

    let missing = |field: &'static str| ConfigError::FieldMissing {
        ingest: ingest.name.clone(),
        field,
    };

    let output = non_empty(engine.output.as_deref()).ok_or_else(|| missing("output"))?;
    let input = non_empty(ingest.input.as_ref().map(|i| i.url.as_str()))
        .ok_or_else(|| missing("input.url"))?;
    let ffmpeg = non_empty(ingest.ffmpeg.as_deref()).ok_or_else(|| missing("ffmpeg"))?;
    let port = listen_port(listens).ok_or_else(|| missing("listen"))?;

    Ok(Some(ProvisioningTemplate {
        key: TemplateKey::new(vhost, ingest.name.clone()),
        class,
        input: input.to_string(),
        ffmpeg: PathBuf::from(ffmpeg),
        output: placeholder::substitute(output, &[(PORT, &port)]),
        engine: EngineProfile::from_directive(engine),
    }))
}

/// Extracts the port of the first listen endpoint.
///
/// Accepts `"1935"`, `"0.0.0.0:1935"` and `"[::]:1935"`.
pub fn listen_port(listens: &[String]) -> Option<String> {
    let endpoint = listens.first()?.trim();
    let port = match endpoint.rfind(':') {
        Some(pos) => &endpoint[pos + 1..],
        None => endpoint,
    };
    (!port.is_empty()).then(|| port.to_string())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::{DirectiveTree, EngineDirective, InputDirective};

    fn directive(name: &str) -> IngestDirective {
        IngestDirective {
            name: name.into(),
            enabled: true,
            input: Some(InputDirective {
                kind: "stream".into(),
                url: "rtsp://[username]:[password]@[ip]/[channel]".into(),
            }),
            ffmpeg: Some("/usr/bin/ffmpeg".into()),
            engines: vec![EngineDirective {
                name: "copy".into(),
                enabled: false,
                vcodec: None,
                acodec: None,
                vparams: vec![],
                aparams: vec![],
                output: Some("rtmp://127.0.0.1:[port]/[vhost]/[channel]".into()),
            }],
        }
    }

    fn listens() -> Vec<String> {
        vec!["0.0.0.0:1935".into()]
    }

    #[test]
    fn test_compiles_valid_directive() {
        let t = compile_ingest("live", &directive("cam1"), &listens())
            .unwrap()
            .unwrap();
        assert_eq!(t.key.to_string(), "live/cam1");
        assert_eq!(t.class, SourceClass::Stream);
        assert_eq!(t.output, "rtmp://127.0.0.1:1935/[vhost]/[channel]");
        assert!(t.engine.is_none());
    }

    #[test]
    fn test_disabled_directive_is_skipped() {
        let mut d = directive("cam1");
        d.enabled = false;
        assert!(compile_ingest("live", &d, &listens()).unwrap().is_none());
    }

    #[test]
    fn test_engine_count_must_be_one() {
        let mut d = directive("cam1");
        d.engines.clear();
        let err = compile_ingest("live", &d, &listens()).unwrap_err();
        assert!(matches!(err, ConfigError::EngineCountInvalid { count: 0, .. }));

        let mut d = directive("cam1");
        d.engines.push(d.engines[0].clone());
        let err = compile_ingest("live", &d, &listens()).unwrap_err();
        assert!(matches!(err, ConfigError::EngineCountInvalid { count: 2, .. }));
    }

    #[test]
    fn test_each_missing_field_is_reported() {
        let mut d = directive("cam1");
        d.engines[0].output = Some("  ".into());
        let err = compile_ingest("live", &d, &listens()).unwrap_err();
        assert!(matches!(err, ConfigError::FieldMissing { field: "output", .. }));

        let mut d = directive("cam1");
        d.input.as_mut().unwrap().url.clear();
        let err = compile_ingest("live", &d, &listens()).unwrap_err();
        assert!(matches!(err, ConfigError::FieldMissing { field: "input.url", .. }));

        let mut d = directive("cam1");
        d.ffmpeg = None;
        let err = compile_ingest("live", &d, &listens()).unwrap_err();
        assert!(matches!(err, ConfigError::FieldMissing { field: "ffmpeg", .. }));

        let err = compile_ingest("live", &directive("cam1"), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::FieldMissing { field: "listen", .. }));
    }

    #[test]
    fn test_invalid_input_type() {
        let mut d = directive("cam1");
        d.input.as_mut().unwrap().kind = "device".into();
        let err = compile_ingest("live", &d, &listens()).unwrap_err();
        assert_eq!(err.as_label(), "input_type_invalid");
    }

    #[test]
    fn test_recompile_is_byte_equal() {
        let d = directive("cam1");
        let a = compile_ingest("live", &d, &listens()).unwrap().unwrap();
        let b = compile_ingest("live", &d, &listens()).unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_listen_port_forms() {
        assert_eq!(listen_port(&["1935".into()]).as_deref(), Some("1935"));
        assert_eq!(listen_port(&["[::]:19350".into()]).as_deref(), Some("19350"));
        assert_eq!(listen_port(&["host:".into()]), None);
        assert_eq!(listen_port(&[]), None);
    }

    #[test]
    fn test_vhost_errors_do_not_stop_other_directives() {
        let mut broken = directive("broken");
        broken.ffmpeg = None;
        let tree = DirectiveTree::single_vhost("live", vec![broken, directive("cam1")]);

        let report = compile_vhost(&tree, "live");
        assert_eq!(report.templates.len(), 1);
        assert_eq!(report.templates[0].key.ingest(), "cam1");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0.ingest(), "broken");
    }
}
