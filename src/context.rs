//! Read-only page facts injected per render
//!
//! The hosting page-serving layer builds one `DataContext` per render from
//! its own social-domain state (profiles, posts, guestbook entries, follows).
//! Templates can read it through expressions but never mutate it.

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerProfile {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub id: String,
    pub handle: String,
}

#[derive(Debug, Clone, Default)]
pub struct DataContext {
    owner: OwnerProfile,
    viewer: Option<Viewer>,
    posts: Vec<Value>,
    guestbook: Vec<Value>,
    friends: Vec<Value>,
    images: Vec<Value>,
    root: Value,
}

impl DataContext {
    pub fn new(owner: OwnerProfile) -> Self {
        let mut ctx = Self {
            owner,
            ..Default::default()
        };
        ctx.rebuild_root();
        ctx
    }

    pub fn with_viewer(mut self, viewer: Viewer) -> Self {
        self.viewer = Some(viewer);
        self.rebuild_root();
        self
    }

    pub fn with_posts(mut self, posts: Vec<Value>) -> Self {
        self.posts = posts;
        self.rebuild_root();
        self
    }

    pub fn with_guestbook(mut self, entries: Vec<Value>) -> Self {
        self.guestbook = entries;
        self.rebuild_root();
        self
    }

    pub fn with_friends(mut self, friends: Vec<Value>) -> Self {
        self.friends = friends;
        self.rebuild_root();
        self
    }

    pub fn with_images(mut self, images: Vec<Value>) -> Self {
        self.images = images;
        self.rebuild_root();
        self
    }

    /// Build a context from an arbitrary JSON document (CLI previewing). The
    /// document shape mirrors the root scope: owner/viewer objects plus
    /// collection arrays.
    pub fn from_json(doc: serde_json::Value) -> Self {
        let owner = doc
            .get("owner")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let viewer = doc
            .get("viewer")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());
        let pick = |key: &str| -> Vec<Value> {
            match doc.get(key) {
                Some(serde_json::Value::Array(items)) => {
                    items.iter().cloned().map(Value::from).collect()
                }
                _ => Vec::new(),
            }
        };
        let mut ctx = Self {
            owner,
            viewer,
            posts: pick("posts"),
            guestbook: pick("guestbook"),
            friends: pick("friends"),
            images: pick("images"),
            root: Value::Empty,
        };
        ctx.rebuild_root();
        ctx
    }

    pub fn owner(&self) -> &OwnerProfile {
        &self.owner
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    pub fn posts(&self) -> &[Value] {
        &self.posts
    }

    pub fn guestbook(&self) -> &[Value] {
        &self.guestbook
    }

    pub fn friends(&self) -> &[Value] {
        &self.friends
    }

    pub fn images(&self) -> &[Value] {
        &self.images
    }

    /// The single fact IfOwner/IfVisitor branch on.
    pub fn viewer_is_owner(&self) -> bool {
        match &self.viewer {
            Some(viewer) => viewer.id == self.owner.id,
            None => false,
        }
    }

    /// Root object expressions resolve bare identifiers against.
    pub fn root(&self) -> &Value {
        &self.root
    }

    fn rebuild_root(&mut self) {
        let mut root: HashMap<String, Value> = HashMap::new();

        let mut owner: HashMap<String, Value> = HashMap::new();
        owner.insert("id".into(), Value::String(self.owner.id.clone()));
        owner.insert("handle".into(), Value::String(self.owner.handle.clone()));
        owner.insert(
            "displayName".into(),
            Value::String(self.owner.display_name.clone()),
        );
        owner.insert("bio".into(), Value::String(self.owner.bio.clone()));
        if let Some(url) = &self.owner.avatar_url {
            owner.insert("avatarUrl".into(), Value::String(url.clone()));
        }
        root.insert("owner".into(), Value::Object(owner));

        if let Some(viewer) = &self.viewer {
            let mut v: HashMap<String, Value> = HashMap::new();
            v.insert("id".into(), Value::String(viewer.id.clone()));
            v.insert("handle".into(), Value::String(viewer.handle.clone()));
            root.insert("viewer".into(), Value::Object(v));
        }

        root.insert("posts".into(), Value::Array(self.posts.clone()));
        root.insert("guestbook".into(), Value::Array(self.guestbook.clone()));
        root.insert("friends".into(), Value::Array(self.friends.clone()));
        root.insert("images".into(), Value::Array(self.images.clone()));
        root.insert("postCount".into(), Value::Number(self.posts.len() as f64));
        root.insert(
            "guestbookCount".into(),
            Value::Number(self.guestbook.len() as f64),
        );
        root.insert(
            "friendCount".into(),
            Value::Number(self.friends.len() as f64),
        );
        root.insert("imageCount".into(), Value::Number(self.images.len() as f64));

        self.root = Value::Object(root);
    }
}
