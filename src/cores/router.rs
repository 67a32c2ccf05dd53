//! Routing from public style ids to (core version, internal style index).

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;

use super::registry::CoreRegistry;
use super::version::{EngineVersion, StyleId, StyleKind};
use crate::error::{Error, Result};

/// Where a style id is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleBinding {
    pub style_id: StyleId,
    pub version: EngineVersion,
    /// Core-internal style index.
    pub index: u32,
    pub name: String,
    pub speaker: String,
    pub model_id: Option<String>,
    pub kind: StyleKind,
}

/// Styles of one speaker, as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Speaker {
    pub name: String,
    pub styles: Vec<StyleBinding>,
}

#[derive(Debug, Clone, Copy, Default)]
struct BindingState {
    live: bool,
    /// Barriers currently waiting for the binding's core to go idle.
    draining: u32,
}

#[derive(Debug, Default)]
struct RouteTable {
    bindings: Vec<StyleBinding>,
    state: Vec<BindingState>,
    by_id: HashMap<StyleId, usize>,
}

enum Lookup<'a> {
    Ready(&'a StyleBinding),
    Draining,
    Missing,
}

impl RouteTable {
    fn lookup(&self, style_id: StyleId) -> Lookup<'_> {
        match self.by_id.get(&style_id) {
            Some(&i) if self.state[i].live && self.state[i].draining == 0 => {
                Lookup::Ready(&self.bindings[i])
            }
            Some(&i) if self.state[i].live => Lookup::Draining,
            _ => Lookup::Missing,
        }
    }

    fn live(&self) -> impl Iterator<Item = (usize, &StyleBinding)> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|&(i, _)| self.state[i].live)
    }

    fn live_for_model<'a>(
        &'a self,
        model_id: &'a str,
    ) -> impl Iterator<Item = (usize, &'a StyleBinding)> + 'a {
        self.live()
            .filter(move |(_, b)| b.model_id.as_deref() == Some(model_id))
    }
}

/// Resolves style ids to the core serving them.
///
/// Built once from a [`CoreRegistry`]. The only change after construction is
/// invalidation of bindings whose voice model was forcibly evicted.
#[derive(Debug, Default)]
pub struct StyleRouter {
    table: RwLock<RouteTable>,
    drain_lock: Mutex<()>,
    drained: Condvar,
}

impl StyleRouter {
    /// Collect bindings from every core, failing on the first style id that
    /// two versions both advertise.
    pub fn build(registry: &CoreRegistry) -> Result<Self> {
        let mut table = RouteTable::default();
        for slot in registry.slots() {
            for style in &slot.capabilities().styles {
                if let Some(&existing) = table.by_id.get(&style.id) {
                    return Err(Error::StyleIdConflict {
                        style_id: style.id,
                        first: table.bindings[existing].version.clone(),
                        second: slot.version().clone(),
                    });
                }
                table.by_id.insert(style.id, table.bindings.len());
                table.bindings.push(StyleBinding {
                    style_id: style.id,
                    version: slot.version().clone(),
                    index: style.index,
                    name: style.name.clone(),
                    speaker: style.speaker.clone(),
                    model_id: style.model.clone(),
                    kind: style.kind,
                });
                table.state.push(BindingState {
                    live: true,
                    draining: 0,
                });
            }
        }
        Ok(Self {
            table: RwLock::new(table),
            ..Default::default()
        })
    }

    /// Look up `style_id`. A binding behind a running barrier is waited for;
    /// every other style resolves immediately.
    pub fn resolve(&self, style_id: StyleId) -> Result<StyleBinding> {
        if let Some(result) = self.try_resolve(style_id) {
            return result;
        }
        let mut guard = self.drain_lock.lock();
        loop {
            if let Some(result) = self.try_resolve(style_id) {
                return result;
            }
            self.drained.wait(&mut guard);
        }
    }

    fn try_resolve(&self, style_id: StyleId) -> Option<Result<StyleBinding>> {
        match self.table.read().lookup(style_id) {
            Lookup::Ready(binding) => Some(Ok(binding.clone())),
            Lookup::Draining => None,
            Lookup::Missing => Some(Err(Error::UnknownStyle(style_id))),
        }
    }

    /// Whether `style_id` has not been invalidated, draining or not.
    pub(crate) fn is_live(&self, style_id: StyleId) -> bool {
        let table = self.table.read();
        table
            .by_id
            .get(&style_id)
            .is_some_and(|&i| table.state[i].live)
    }

    /// Live bindings in core version order, then core style order.
    pub fn bindings(&self) -> Vec<StyleBinding> {
        self.table.read().live().map(|(_, b)| b.clone()).collect()
    }

    pub fn bindings_for_model(&self, model_id: &str) -> Vec<StyleBinding> {
        self.table
            .read()
            .live_for_model(model_id)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Live bindings grouped by speaker, in order of first appearance.
    pub fn speakers(&self) -> Vec<Speaker> {
        let mut speakers: Vec<Speaker> = Vec::new();
        for binding in self.bindings() {
            match speakers.iter_mut().find(|s| s.name == binding.speaker) {
                Some(speaker) => speaker.styles.push(binding),
                None => speakers.push(Speaker {
                    name: binding.speaker.clone(),
                    styles: vec![binding],
                }),
            }
        }
        speakers
    }

    /// Hold back new resolutions of `model_id`'s live bindings until the
    /// returned guard is dropped. Other styles keep resolving.
    pub(crate) fn drain(&self, model_id: &str) -> Drain<'_> {
        let mut table = self.table.write();
        let affected: Vec<usize> = table.live_for_model(model_id).map(|(i, _)| i).collect();
        let mut versions: Vec<EngineVersion> = affected
            .iter()
            .map(|&i| table.bindings[i].version.clone())
            .collect();
        versions.sort();
        versions.dedup();
        for &i in &affected {
            table.state[i].draining += 1;
        }
        Drain {
            router: self,
            affected,
            versions,
        }
    }
}

/// Bindings of one model held back from resolution.
pub(crate) struct Drain<'a> {
    router: &'a StyleRouter,
    affected: Vec<usize>,
    versions: Vec<EngineVersion>,
}

impl Drain<'_> {
    /// Versions serving the held bindings, in lock order.
    pub(crate) fn versions(&self) -> &[EngineVersion] {
        &self.versions
    }

    /// Mark the held bindings dead; returns their style ids.
    pub(crate) fn invalidate(&self) -> Vec<StyleId> {
        let mut table = self.router.table.write();
        let mut invalidated = Vec::new();
        for &i in &self.affected {
            if table.state[i].live {
                table.state[i].live = false;
                invalidated.push(table.bindings[i].style_id);
            }
        }
        invalidated
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        {
            let mut table = self.router.table.write();
            for &i in &self.affected {
                table.state[i].draining -= 1;
            }
        }
        let _guard = self.router.drain_lock.lock();
        self.router.drained.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::engines::mock::MockCore;
    use crate::StyleInfo;

    fn style(index: u32, id: u32, speaker: &str, model: Option<&str>) -> StyleInfo {
        StyleInfo {
            index,
            id: StyleId(id),
            name: format!("style-{id}"),
            speaker: speaker.to_string(),
            model: model.map(str::to_string),
            kind: StyleKind::Talk,
        }
    }

    fn registry(cores: Vec<(&str, Vec<StyleInfo>)>) -> CoreRegistry {
        let mut builder = CoreRegistry::builder();
        for (version, styles) in cores {
            builder
                .add(version.into(), Box::new(MockCore::with_styles(styles)))
                .unwrap();
        }
        builder.build().0
    }

    #[test]
    fn resolves_across_versions() {
        let registry = registry(vec![
            ("0.1.0", vec![style(0, 10, "a", None), style(1, 11, "a", None)]),
            ("0.2.0", vec![style(0, 20, "b", None)]),
        ]);
        let router = StyleRouter::build(&registry).unwrap();

        let binding = router.resolve(StyleId(11)).unwrap();
        assert_eq!(binding.version, EngineVersion::from("0.1.0"));
        assert_eq!(binding.index, 1);
        assert_eq!(router.resolve(StyleId(20)).unwrap().version.as_str(), "0.2.0");
        assert_eq!(router.resolve(StyleId(11)).unwrap(), binding);
    }

    #[test]
    fn unknown_style_names_the_id() {
        let router = StyleRouter::build(&registry(vec![(
            "0.1.0",
            vec![style(0, 1, "a", None)],
        )]))
        .unwrap();
        match router.resolve(StyleId(99)) {
            Err(Error::UnknownStyle(id)) => assert_eq!(id, StyleId(99)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn conflicting_style_ids_fail_construction() {
        let registry = registry(vec![
            ("0.1.0", vec![style(0, 7, "a", None)]),
            ("0.2.0", vec![style(0, 7, "b", None)]),
        ]);
        match StyleRouter::build(&registry) {
            Err(Error::StyleIdConflict {
                style_id,
                first,
                second,
            }) => {
                assert_eq!(style_id, StyleId(7));
                assert_eq!(first.as_str(), "0.1.0");
                assert_eq!(second.as_str(), "0.2.0");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalidated_model_styles_stop_resolving() {
        let router = StyleRouter::build(&registry(vec![(
            "0.1.0",
            vec![
                style(0, 1, "a", Some("model-a")),
                style(1, 2, "b", Some("model-b")),
            ],
        )]))
        .unwrap();
        assert_eq!(router.bindings_for_model("model-a").len(), 1);

        let drain = router.drain("model-a");
        assert_eq!(drain.versions(), &[EngineVersion::from("0.1.0")]);
        assert_eq!(drain.invalidate(), vec![StyleId(1)]);
        drop(drain);
        assert!(matches!(
            router.resolve(StyleId(1)),
            Err(Error::UnknownStyle(_))
        ));
        assert!(router.resolve(StyleId(2)).is_ok());
        assert!(router.bindings_for_model("model-a").is_empty());
    }

    #[test]
    fn speakers_group_styles() {
        let router = StyleRouter::build(&registry(vec![(
            "0.1.0",
            vec![
                style(0, 1, "a", None),
                style(1, 2, "b", None),
                style(2, 3, "a", None),
            ],
        )]))
        .unwrap();
        let speakers = router.speakers();
        assert_eq!(speakers.len(), 2);
        assert_eq!(speakers[0].name, "a");
        assert_eq!(speakers[0].styles.len(), 2);
    }
    #[test]
    fn draining_holds_back_only_the_model_styles() {
        let router = Arc::new(
            StyleRouter::build(&registry(vec![(
                "0.1.0",
                vec![style(0, 1, "a", Some("model-a")), style(1, 2, "a", None)],
            )]))
            .unwrap(),
        );
        let drain = router.drain("model-a");
        assert!(router.resolve(StyleId(2)).is_ok());

        let waiting = {
            let router = router.clone();
            thread::spawn(move || router.resolve(StyleId(1)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiting.is_finished());

        drain.invalidate();
        drop(drain);
        assert!(matches!(
            waiting.join().unwrap(),
            Err(Error::UnknownStyle(_))
        ));
    }

    #[test]
    fn finished_drain_releases_waiters() {
        let router = Arc::new(
            StyleRouter::build(&registry(vec![(
                "0.1.0",
                vec![style(0, 1, "a", Some("model-a"))],
            )]))
            .unwrap(),
        );
        let drain = router.drain("model-a");
        let waiting = {
            let router = router.clone();
            thread::spawn(move || router.resolve(StyleId(1)))
        };
        thread::sleep(Duration::from_millis(20));
        drop(drain);
        assert_eq!(waiting.join().unwrap().unwrap().style_id, StyleId(1));
    }
}

