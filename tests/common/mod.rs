#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vox_core::engines::mock::MockCore;
use vox_core::{
    AccentPhrase, Capabilities, CoreEngine, StyleId, StyleInfo, StyleKind, SynthesisOptions,
    SynthesisQuery,
};
use zip::write::SimpleFileOptions;

pub fn talk_style(index: u32, id: u32, model: Option<&str>) -> StyleInfo {
    StyleInfo {
        index,
        id: StyleId(id),
        name: format!("style-{id}"),
        speaker: "speaker".to_string(),
        model: model.map(str::to_string),
        kind: StyleKind::Talk,
    }
}

pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Mock core that runs `hook` at the start of every `synthesize` call.
pub struct HookedCore {
    inner: MockCore,
    hook: Hook,
}

impl HookedCore {
    pub fn new(styles: Vec<StyleInfo>, hook: Hook) -> Self {
        Self {
            inner: MockCore::with_styles(styles),
            hook,
        }
    }
}

impl CoreEngine for HookedCore {
    fn load(&mut self, path: &Path) -> vox_core::Result<()> {
        self.inner.load(path)
    }

    fn unload(&mut self) {
        self.inner.unload()
    }

    fn capabilities(&self) -> vox_core::Result<Capabilities> {
        self.inner.capabilities()
    }

    fn predict(
        &mut self,
        phrases: &[AccentPhrase],
        style: u32,
    ) -> vox_core::Result<Vec<AccentPhrase>> {
        self.inner.predict(phrases, style)
    }

    fn synthesize(
        &mut self,
        query: &SynthesisQuery,
        style: u32,
        options: &SynthesisOptions,
    ) -> vox_core::Result<Vec<f32>> {
        (self.hook)();
        self.inner.synthesize(query, style, options)
    }
}

/// Write a voice-model package with a manifest binding style `style_id`.
pub fn model_package(dir: &Path, id: &str, style_id: u32) -> PathBuf {
    let path = dir.join(format!("{id}.zip"));
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file("manifest.json", options).unwrap();
    write!(
        zip,
        r#"{{"manifest_version": "1.0", "id": "{id}", "name": "{id}", "version": "0.1.0",
            "styles": [{{"id": {style_id}, "name": "normal"}}]}}"#
    )
    .unwrap();
    zip.start_file("model.bin", options).unwrap();
    zip.write_all(&[0u8; 16]).unwrap();
    zip.finish().unwrap();
    path
}

/// Write a mock core directory advertising `styles`.
pub fn mock_core_dir(root: &Path, version: &str, styles: &[StyleInfo]) -> PathBuf {
    let dir = root.join(version);
    std::fs::create_dir_all(&dir).unwrap();
    let descriptor = serde_json::json!({
        "kind": "mock",
        "version": version,
        "styles": styles,
    });
    std::fs::write(dir.join("core.json"), descriptor.to_string()).unwrap();
    dir
}
