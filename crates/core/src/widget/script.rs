//! Script elements and the document they are inserted into.

use core::fmt;

use serde::Serialize;

/// The three scripts the widget loader inserts, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// General-purpose DOM helper library used by the widget's branding layer.
    Dependency,
    /// Inline block registering the widget callback hooks.
    Config,
    /// The third-party payment widget.
    Widget,
}

impl ScriptKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dependency => "dependency",
            Self::Config => "config",
            Self::Widget => "widget",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dependency => "dependency library",
            Self::Config => "configuration script",
            Self::Widget => "payment widget script",
        })
    }
}

/// A `<script>` element to insert. Either `src` or `text` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptElement {
    pub kind: ScriptKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<String>,
    #[serde(rename = "async")]
    pub is_async: bool,
}

impl ScriptElement {
    /// An external script.
    #[must_use]
    pub fn external(kind: ScriptKind, src: impl Into<String>, nonce: &str) -> Self {
        Self {
            kind,
            src: Some(src.into()),
            text: None,
            nonce: nonce.to_owned(),
            integrity: None,
            cross_origin: None,
            is_async: false,
        }
    }

    /// An inline script.
    #[must_use]
    pub fn inline(kind: ScriptKind, text: impl Into<String>, nonce: &str) -> Self {
        Self {
            kind,
            src: None,
            text: Some(text.into()),
            nonce: nonce.to_owned(),
            integrity: None,
            cross_origin: None,
            is_async: false,
        }
    }
}

/// Identifies an element previously inserted into a [`ScriptHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle(u64);

impl ScriptHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// The document scripts are attached to.
///
/// Load and error notifications flow back into the loader through
/// [`super::WidgetLoader::script_loaded`] and
/// [`super::WidgetLoader::script_failed`].
pub trait ScriptHost {
    /// Attach an element and return a handle for removing it later.
    fn insert(&mut self, element: ScriptElement) -> ScriptHandle;

    /// Detach an element previously returned by [`Self::insert`].
    ///
    /// Removing an unknown or already removed handle is a no-op.
    fn remove(&mut self, handle: ScriptHandle);
}

/// A host operation, as recorded by [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Inserted(ScriptHandle, ScriptKind),
    Removed(ScriptHandle),
}

/// In-memory document that keeps attached elements in insertion order.
///
/// Used to render server-side markup and to observe the loader in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingHost {
    next_id: u64,
    attached: Vec<(ScriptHandle, ScriptElement)>,
    log: Vec<HostOp>,
}

impl RecordingHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements currently attached, in insertion order.
    pub fn attached(&self) -> impl Iterator<Item = &ScriptElement> {
        self.attached.iter().map(|(_, element)| element)
    }

    /// Every insert and remove, in order.
    #[must_use]
    pub fn log(&self) -> &[HostOp] {
        &self.log
    }

    /// Number of attached elements of the given kind.
    #[must_use]
    pub fn count(&self, kind: ScriptKind) -> usize {
        self.attached().filter(|e| e.kind == kind).count()
    }
}

impl ScriptHost for RecordingHost {
    fn insert(&mut self, element: ScriptElement) -> ScriptHandle {
        self.next_id += 1;
        let handle = ScriptHandle::new(self.next_id);
        self.log.push(HostOp::Inserted(handle, element.kind));
        self.attached.push((handle, element));
        handle
    }

    fn remove(&mut self, handle: ScriptHandle) {
        let before = self.attached.len();
        self.attached.retain(|(h, _)| *h != handle);
        if self.attached.len() != before {
            self.log.push(HostOp::Removed(handle));
        }
    }
}
