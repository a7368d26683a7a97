use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::Instant,
};

use anyhow::Context;

use crate::environment::EnvironmentMap;

/// A glTF file with its buffers and images already decoded.
pub struct GltfAsset {
    pub file_name: String,
    pub document: gltf::Document,
    pub buffers: Vec<gltf::buffer::Data>,
    pub images: Vec<gltf::image::Data>,
}

impl GltfAsset {
    pub fn import(path: &Path) -> anyhow::Result<Self> {
        let (document, buffers, images) = gltf::import(path)
            .with_context(|| format!("Failed to import glTF file {}", path.display()))?;

        Ok(Self {
            file_name: path.to_string_lossy().to_string(),
            document,
            buffers,
            images,
        })
    }
}

/// The result of a load running on a background thread. Delivers exactly once.
pub struct PendingAsset<T> {
    name: String,
    receiver: Option<Receiver<anyhow::Result<T>>>,
}

impl<T: Send + 'static> PendingAsset<T> {
    pub fn spawn<F>(name: impl Into<String>, load: F) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let name: String = name.into();
        let (sender, receiver) = mpsc::channel();

        let thread_name = format!("load {name}");
        let log_name = name.clone();
        thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let started = Instant::now();
                let result = load();
                log::debug!("Loading {} took {:?}", log_name, started.elapsed());
                // The viewer may have shut down already, nobody to tell then
                let _ = sender.send(result);
            })
            .with_context(|| format!("Failed to spawn loader thread for {name}"))?;

        Ok(Self {
            name,
            receiver: Some(receiver),
        })
    }
}

impl<T> PendingAsset<T> {
    /// Returns the result once, the first time it is available.
    pub fn poll(&mut self) -> Option<anyhow::Result<T>> {
        let receiver = self.receiver.as_ref()?;

        match receiver.try_recv() {
            Ok(result) => {
                self.receiver = None;
                Some(result.with_context(|| format!("Failed to load {}", self.name)))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                Some(Err(anyhow::anyhow!(
                    "Loader thread for {} exited without a result",
                    self.name
                )))
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.receiver.is_none()
    }
}

pub fn load_model(path: PathBuf) -> anyhow::Result<PendingAsset<GltfAsset>> {
    let name = path.display().to_string();
    PendingAsset::spawn(name, move || GltfAsset::import(&path))
}

pub fn load_environment(path: PathBuf) -> anyhow::Result<PendingAsset<EnvironmentMap>> {
    let name = path.display().to_string();
    PendingAsset::spawn(name, move || EnvironmentMap::load(&path))
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::GltfAsset;

    /// A binary glTF holding one node "Ring" with a single triangle mesh
    /// spanning (0, 0, 0)..(1, 2, 0), placed at (10, 0, 0) with scale 2.
    pub fn triangle_glb() -> Vec<u8> {
        glb_from_json(
            r#"{
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "Ring", "mesh": 0, "translation": [10, 0, 0], "scale": [2, 2, 2] }],
            "meshes": [{ "name": "RingMesh", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
            "buffers": [{ "byteLength": 42 }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 2, 0] },
                { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
            ]
        }"#,
        )
    }

    /// Packs `json` into a GLB together with a binary chunk holding the
    /// triangle positions (0, 0, 0), (1, 0, 0), (0, 2, 0) in bytes 0..36 and
    /// the u16 indices 0, 1, 2 in bytes 36..42.
    pub fn glb_from_json(json: &str) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }

        let mut bin = Vec::new();
        for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.0] {
            bin.extend_from_slice(&value.to_le_bytes());
        }
        for index in [0u16, 1, 2] {
            bin.extend_from_slice(&index.to_le_bytes());
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total_length = 12 + 8 + json.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total_length);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total_length as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }

    pub fn asset_from_glb(file_name: &str, glb: Vec<u8>) -> GltfAsset {
        let (document, buffers, images) = gltf::import_slice(glb).expect("test glb is valid");

        GltfAsset {
            file_name: file_name.to_string(),
            document,
            buffers,
            images,
        }
    }

    pub fn triangle_asset() -> GltfAsset {
        asset_from_glb("triangle.glb", triangle_glb())
    }

    /// The triangle "Ring" next to a node "Guide" whose mesh is drawn as
    /// lines.
    pub fn ring_with_guide_asset() -> GltfAsset {
        let glb = glb_from_json(
            r#"{
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0, 1] }],
            "nodes": [
                { "name": "Ring", "mesh": 0 },
                { "name": "Guide", "mesh": 1, "translation": [50, 0, 0] }
            ],
            "meshes": [
                { "name": "RingMesh", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] },
                { "name": "GuideLines", "primitives": [{ "attributes": { "POSITION": 0 }, "mode": 1 }] }
            ],
            "buffers": [{ "byteLength": 42 }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 2, 0] },
                { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
            ]
        }"#,
        );
        asset_from_glb("ring_with_guide.glb", glb)
    }
}
