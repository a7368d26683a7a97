use glam::{Mat4, Quat, Vec3};
use id_arena::Arena;
use std::collections::HashMap;

use crate::loader::GltfAsset;
use crate::material_manager::{MaterialId, MaterialManager};
use crate::math::bounds::AABB;
use crate::model::Model;
use crate::scene_graph::object3d::{Object3D, ObjectId};
use crate::scene_graph::scene_model::{SceneModel, SceneModelId};
use crate::scene_graph::transform::Transform;

/// Translation given to a model root by [`Scene::normalize_object`], and the
/// uniform factor its scale was multiplied by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub translation: Vec3,
    pub scale: f32,
}

pub struct Scene {
    pub objects: Arena<Object3D>,
    pub models: Arena<SceneModel>,
    gltf_mesh_to_model: HashMap<(String, usize), Option<SceneModelId>>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Arena::new(),
            models: Arena::new(),
            gltf_mesh_to_model: HashMap::new(),
        }
    }

    pub fn add_object(&mut self, object: Object3D) -> ObjectId {
        self.objects.alloc(object)
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&Object3D> {
        self.objects.get(id)
    }

    pub fn add_model(&mut self, model: SceneModel) -> SceneModelId {
        self.models.alloc(model)
    }

    /// Spawns every node of a glTF scene under a new root object and returns
    /// the root.
    pub fn spawn_gltf_scene(
        &mut self,
        material_manager: &mut MaterialManager,
        asset: &GltfAsset,
        scene: &gltf::Scene,
    ) -> anyhow::Result<ObjectId> {
        let root_name = scene.name().unwrap_or(&asset.file_name).to_string();
        let root_id = self.add_object(Object3D::named(root_name));

        for node in scene.nodes() {
            if let Err(e) = self.spawn_gltf_node(material_manager, asset, &node, root_id) {
                // Keep whatever was already spawned out of the frame
                if let Some(root) = self.objects.get_mut(root_id) {
                    root.visible = false;
                }
                return Err(e);
            }
        }

        Ok(root_id)
    }

    fn spawn_gltf_node(
        &mut self,
        material_manager: &mut MaterialManager,
        asset: &GltfAsset,
        node: &gltf::Node,
        parent: ObjectId,
    ) -> anyhow::Result<ObjectId> {
        let node_name = node.name().unwrap_or("Unnamed").to_string();
        let mut object = Object3D::named(node_name.clone());
        let (translation, rotation, scale) = node.transform().decomposed();
        object
            .transform
            .set_transform(translation.into(), Quat::from_array(rotation), scale.into());

        if let Some(mesh) = node.mesh() {
            let key = (asset.file_name.clone(), mesh.index());

            let model_id = match self.gltf_mesh_to_model.get(&key).copied() {
                Some(model_id) => model_id,
                None => {
                    let mesh_name = mesh
                        .name()
                        .map(String::from)
                        .unwrap_or_else(|| format!("{} (Mesh)", node_name));

                    let model_id =
                        match Model::from_gltf(material_manager, asset, mesh_name.clone(), mesh)? {
                            Some(model) => Some(self.add_model(SceneModel::new(model))),
                            None => {
                                log::warn!(
                                    "Mesh {} has no triangles, spawning {} without it",
                                    mesh_name,
                                    node_name
                                );
                                None
                            }
                        };
                    self.gltf_mesh_to_model.insert(key, model_id);

                    model_id
                }
            };

            object.model_id = model_id;
        }

        let object_id = self.add_object(object);
        self.set_object_parent(object_id, Some(parent));

        for child in node.children() {
            self.spawn_gltf_node(material_manager, asset, &child, object_id)?;
        }

        Ok(object_id)
    }

    /// `root` and all of its descendants, depth first.
    pub fn descendants(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut result = Vec::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            result.push(id);
            stack.extend(object.child_ids.iter().rev());
        }

        result
    }

    /// Every object whose ancestors are all visible, in hierarchical order.
    pub fn visible_objects(&self) -> Vec<ObjectId> {
        let mut result = Vec::new();
        let mut stack = self
            .objects
            .iter()
            .filter(|(_, object)| object.parent_id.is_none())
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        while let Some(id) = stack.pop() {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            if !object.visible {
                continue;
            }
            result.push(id);
            stack.extend(object.child_ids.iter().copied());
        }

        result
    }

    /// Objects under `root` (inclusive) that carry a mesh.
    pub fn mesh_objects(&self, root: ObjectId) -> Vec<ObjectId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.objects.get(*id).is_some_and(Object3D::is_mesh))
            .collect()
    }

    /// Materials used by any mesh under `root`, once per mesh primitive.
    pub fn material_ids(&self, root: ObjectId) -> Vec<MaterialId> {
        self.mesh_objects(root)
            .into_iter()
            .filter_map(|id| self.objects.get(id)?.model_id)
            .filter_map(|model_id| self.models.get(model_id))
            .flat_map(|scene_model| scene_model.model.material_ids())
            .collect()
    }

    /// Bounding box of all meshes under `root`, in the space of `root`'s parent.
    ///
    /// Matrices are recomputed from the local transforms, so the result is
    /// correct even before `late_update` has run.
    pub fn bounding_box(&self, root: ObjectId) -> Option<AABB> {
        self.bounding_box_recursive(root, Mat4::IDENTITY)
    }

    fn bounding_box_recursive(&self, object_id: ObjectId, parent_matrix: Mat4) -> Option<AABB> {
        let object = self.objects.get(object_id)?;
        let matrix = parent_matrix * *object.transform.get_local_matrix();

        let own = object
            .model_id
            .and_then(|model_id| self.models.get(model_id))
            .and_then(|scene_model| scene_model.model.bounding_box())
            .map(|aabb| aabb.transformed(&matrix));

        object
            .child_ids
            .iter()
            .filter_map(|&child_id| self.bounding_box_recursive(child_id, matrix))
            .fold(own, |acc, child| match acc {
                Some(acc) => Some(acc.union(&child)),
                None => Some(child),
            })
    }

    /// Moves and uniformly scales `root` so that its bounding box is centered on
    /// the origin of its parent space with the longest side equal to
    /// `target_size`. Returns `None` and leaves the object alone if there is no
    /// geometry under it.
    pub fn normalize_object(&mut self, root: ObjectId, target_size: f32) -> Option<Normalization> {
        let bounds = self.bounding_box(root)?;
        let center = bounds.center();
        let max_dimension = bounds.max_dimension();

        let factor = if max_dimension > 0.0 && max_dimension.is_finite() {
            target_size / max_dimension
        } else {
            log::warn!("Model has a degenerate bounding box {:?}, not scaling", bounds);
            1.0
        };

        let transform = &self.objects.get(root)?.transform;
        let translation = (transform.translation() - center) * factor;
        let scale = transform.scale() * factor;
        let rotation = transform.rotation();

        self.set_object_transform(root, translation, rotation, scale);

        Some(Normalization {
            translation,
            scale: factor,
        })
    }

    /// Updates all object transforms in hierarchical order
    fn update_transforms(&self) {
        let root_objects = self.objects.iter().filter_map(|(id, object)| {
            if object.parent_id.is_none() {
                Some(id)
            } else {
                None
            }
        });

        for root_id in root_objects {
            self.update_object_transform_recursive(root_id, Mat4::IDENTITY);
        }
    }

    /// Recursively updates an object's world transform and its children
    fn update_object_transform_recursive(&self, object_id: ObjectId, parent_world_matrix: Mat4) {
        if let Some(object) = self.objects.get(object_id) {
            if object.transform.is_world_dirty() {
                let local_matrix = *object.transform.get_local_matrix();
                let world_matrix = parent_world_matrix * local_matrix;
                object.transform.set_world_matrix(world_matrix);
            }

            let world_matrix = *object.transform.get_world_matrix();
            for &child_id in &object.child_ids {
                self.update_object_transform_recursive(child_id, world_matrix);
            }
        }
    }

    /// Invalidates world transforms for an object and all its descendants
    pub fn invalidate_object_hierarchy(&self, object_id: ObjectId) {
        if let Some(object) = self.objects.get(object_id) {
            object.transform.invalidate_world();

            for &child_id in &object.child_ids {
                self.invalidate_object_hierarchy(child_id);
            }
        }
    }

    /// Sets the parent of an object and updates child relationships
    pub fn set_object_parent(&mut self, child_id: ObjectId, new_parent_id: Option<ObjectId>) {
        if let Some(child) = self.objects.get(child_id) {
            if let Some(old_parent_id) = child.parent_id {
                if let Some(old_parent) = self.objects.get_mut(old_parent_id) {
                    old_parent.child_ids.retain(|&id| id != child_id);
                }
            }
        }

        if let Some(child) = self.objects.get_mut(child_id) {
            child.parent_id = new_parent_id;

            if let Some(new_parent_id) = new_parent_id {
                if let Some(new_parent) = self.objects.get_mut(new_parent_id) {
                    new_parent.child_ids.push(child_id);
                }
            }
        }

        self.invalidate_object_hierarchy(child_id);
    }

    pub fn set_object_rotation(&mut self, object_id: ObjectId, rotation: Quat) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_rotation(rotation);
        }
        self.invalidate_object_hierarchy(object_id);
    }

    pub fn set_object_transform(
        &mut self,
        object_id: ObjectId,
        translation: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_transform(translation, rotation, scale);
        }
        self.invalidate_object_hierarchy(object_id);
    }

    pub fn get_object_transform(&self, object_id: ObjectId) -> Option<&Transform> {
        self.objects.get(object_id).map(|object| &object.transform)
    }

    pub fn late_update(&mut self) {
        self.update_transforms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_util::box_model;

    fn spawn_box(
        scene: &mut Scene,
        materials: &mut MaterialManager,
        parent: ObjectId,
        min: Vec3,
        max: Vec3,
    ) -> ObjectId {
        let model = box_model(materials, "Box", min, max, None);
        let model_id = scene.add_model(SceneModel::new(model));
        let mut object = Object3D::named("Box");
        object.model_id = Some(model_id);
        let id = scene.add_object(object);
        scene.set_object_parent(id, Some(parent));
        id
    }

    fn assert_normalized(scene: &Scene, root: ObjectId) {
        let bounds = scene.bounding_box(root).unwrap();
        assert!(
            bounds.center().abs_diff_eq(Vec3::ZERO, 1e-5),
            "center {:?}",
            bounds.center()
        );
        assert!(
            (bounds.max_dimension() - 1.5).abs() < 1e-5,
            "size {:?}",
            bounds.size()
        );
    }

    #[test]
    fn offset_model_is_centered_and_scaled() {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene.add_object(Object3D::named("Root"));
        spawn_box(
            &mut scene,
            &mut materials,
            root,
            Vec3::new(10.0, 20.0, 30.0),
            Vec3::new(14.0, 22.0, 31.0),
        );

        let normalization = scene.normalize_object(root, 1.5).unwrap();

        assert!((normalization.scale - 1.5 / 4.0).abs() < 1e-6);
        assert_normalized(&scene, root);
    }

    #[test]
    fn nested_transforms_are_part_of_the_bounds() {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene.add_object(Object3D::named("Root"));
        let group = scene.add_object(Object3D::named("Group"));
        scene.set_object_parent(group, Some(root));
        scene.set_object_transform(
            group,
            Vec3::new(0.0, -3.0, 0.0),
            Quat::from_rotation_z(0.3),
            Vec3::splat(0.01),
        );
        spawn_box(&mut scene, &mut materials, group, Vec3::ZERO, Vec3::splat(100.0));
        spawn_box(
            &mut scene,
            &mut materials,
            root,
            Vec3::new(2.0, 2.0, 2.0),
            Vec3::new(2.5, 2.5, 2.5),
        );

        scene.normalize_object(root, 1.5).unwrap();

        assert_normalized(&scene, root);
    }

    #[test]
    fn root_with_existing_transform_is_normalized() {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene.add_object(Object3D::named("Root"));
        scene.set_object_transform(
            root,
            Vec3::new(5.0, 0.0, -1.0),
            Quat::from_rotation_y(1.0),
            Vec3::new(3.0, 1.0, 0.5),
        );
        spawn_box(&mut scene, &mut materials, root, Vec3::splat(-0.1), Vec3::splat(0.4));

        scene.normalize_object(root, 1.5).unwrap();

        assert_normalized(&scene, root);
        let rotation = scene.get_object_transform(root).unwrap().rotation();
        assert!(rotation.abs_diff_eq(Quat::from_rotation_y(1.0), 1e-6));
    }

    #[test]
    fn tiny_models_are_scaled_up() {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene.add_object(Object3D::named("Root"));
        spawn_box(&mut scene, &mut materials, root, Vec3::ZERO, Vec3::splat(0.001));

        let normalization = scene.normalize_object(root, 1.5).unwrap();

        assert!(normalization.scale > 1000.0);
        assert_normalized(&scene, root);
    }

    #[test]
    fn zero_extent_models_are_centered_but_not_scaled() {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene.add_object(Object3D::named("Root"));
        spawn_box(&mut scene, &mut materials, root, Vec3::splat(3.0), Vec3::splat(3.0));

        let normalization = scene.normalize_object(root, 1.5).unwrap();

        assert_eq!(normalization.scale, 1.0);
        assert!(normalization.translation.abs_diff_eq(Vec3::splat(-3.0), 1e-6));
        let bounds = scene.bounding_box(root).unwrap();
        assert!(bounds.center().abs_diff_eq(Vec3::ZERO, 1e-6));
        assert_eq!(scene.get_object_transform(root).unwrap().scale(), Vec3::ONE);
    }

    #[test]
    fn non_uniform_scale_reaches_the_bounds() {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene.add_object(Object3D::named("Root"));
        let group = scene.add_object(Object3D::named("Flattened"));
        scene.set_object_parent(group, Some(root));
        scene.set_object_transform(group, Vec3::ZERO, Quat::IDENTITY, Vec3::new(1.0, 1.0, 0.1));
        spawn_box(&mut scene, &mut materials, group, Vec3::ZERO, Vec3::new(1.0, 1.0, 10.0));

        let bounds = scene.bounding_box(root).unwrap();
        assert!(bounds.size().abs_diff_eq(Vec3::ONE, 1e-5), "size {:?}", bounds.size());

        scene.normalize_object(root, 1.5).unwrap();
        assert_normalized(&scene, root);
    }

    #[test]
    fn gltf_node_scale_is_kept_per_axis() {
        let asset = crate::loader::test_util::asset_from_glb(
            "squashed.glb",
            crate::loader::test_util::glb_from_json(
                r#"{
                "asset": { "version": "2.0" },
                "scenes": [{ "nodes": [0] }],
                "nodes": [{ "name": "Squashed", "mesh": 0, "scale": [2, 1, 0.5] }],
                "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
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
            ),
        );
        let gltf_scene = asset.document.scenes().next().unwrap();

        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene
            .spawn_gltf_scene(&mut materials, &asset, &gltf_scene)
            .unwrap();

        let node = scene.mesh_objects(root)[0];
        let transform = scene.get_object_transform(node).unwrap();
        assert_eq!(transform.scale(), Vec3::new(2.0, 1.0, 0.5));

        let bounds = scene.bounding_box(root).unwrap();
        assert!(bounds.size().abs_diff_eq(Vec3::new(2.0, 2.0, 0.0), 1e-6));
    }

    #[test]
    fn line_meshes_are_spawned_without_a_model() {
        let asset = crate::loader::test_util::ring_with_guide_asset();
        let gltf_scene = asset.document.scenes().next().unwrap();

        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene
            .spawn_gltf_scene(&mut materials, &asset, &gltf_scene)
            .unwrap();

        let names = scene
            .descendants(root)
            .into_iter()
            .filter_map(|id| scene.get_object(id))
            .filter(|object| !object.is_mesh())
            .map(|object| object.name.clone())
            .collect::<Vec<_>>();
        assert!(names.contains(&"Guide".to_string()));
        assert_eq!(scene.mesh_objects(root).len(), 1);
        assert_eq!(scene.models.len(), 1);
    }

    #[test]
    fn model_without_geometry_is_left_alone() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::named("Empty"));
        let child = scene.add_object(Object3D::named("Child"));
        scene.set_object_parent(child, Some(root));

        assert!(scene.normalize_object(root, 1.5).is_none());
        let transform = scene.get_object_transform(root).unwrap();
        assert_eq!(transform.translation(), Vec3::ZERO);
        assert_eq!(transform.scale(), Vec3::ONE);
    }

    #[test]
    fn world_matrices_follow_parents_after_late_update() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::named("Root"));
        let child = scene.add_object(Object3D::named("Child"));
        scene.set_object_parent(child, Some(root));
        scene.set_object_transform(child, Vec3::X, Quat::IDENTITY, Vec3::ONE);
        scene.set_object_transform(root, Vec3::Y, Quat::IDENTITY, Vec3::splat(2.0));

        scene.late_update();

        let world = *scene.get_object_transform(child).unwrap().get_world_matrix();
        assert!(world
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(2.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn hidden_objects_hide_their_subtree() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::named("Root"));
        let child = scene.add_object(Object3D::named("Child"));
        scene.set_object_parent(child, Some(root));
        let other = scene.add_object(Object3D::named("Other"));

        assert_eq!(scene.visible_objects().len(), 3);

        scene.objects.get_mut(root).unwrap().visible = false;
        assert_eq!(scene.visible_objects(), vec![other]);
    }

    #[test]
    fn traversal_finds_meshes_and_their_materials() {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let root = scene.add_object(Object3D::named("Root"));
        let group = scene.add_object(Object3D::named("Group"));
        scene.set_object_parent(group, Some(root));
        let a = spawn_box(&mut scene, &mut materials, group, Vec3::ZERO, Vec3::ONE);
        let b = spawn_box(&mut scene, &mut materials, root, Vec3::ZERO, Vec3::ONE);

        let meshes = scene.mesh_objects(root);
        assert_eq!(meshes.len(), 2);
        assert!(meshes.contains(&a) && meshes.contains(&b));
        assert_eq!(scene.descendants(root).len(), 4);
        assert_eq!(scene.material_ids(root).len(), 2);
    }
}
