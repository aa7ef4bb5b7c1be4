//! Target discovery tests

#[cfg(test)]
mod tests {
    use cua_link::discovery::{control_targets, TargetFilter};
    use cua_link::host::BodyState;
    use cua_link::naming::ScopePrefix;
    use cua_link::{LinkError, MemoryScene, Transform, Vec3};

    const SUBPATH: &str = "object/rescaleObject";

    fn make_scene(owner: &str, names: &[&str]) -> MemoryScene {
        let scene = MemoryScene::new();
        scene.add_asset(
            owner,
            SUBPATH,
            names.iter().enumerate().map(|(i, name)| {
                (
                    *name,
                    BodyState {
                        transform: Transform::at(Vec3::new(i as f32, 0.0, 0.0)),
                        mass: 1.0,
                    },
                )
            }),
        );
        scene
    }

    fn names(scene: &MemoryScene, owner: &str, pattern: &str) -> Vec<String> {
        let prefix = ScopePrefix::for_owner(owner);
        let filter = TargetFilter::new(pattern).unwrap();
        control_targets(scene, owner, SUBPATH, &prefix, &filter)
            .map(|t| t.body.name)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Filtering
    // -----------------------------------------------------------------------

    #[test]
    fn anchored_pattern_selects_matching_bodies() {
        let scene = make_scene("Atom1", &["Hip", "Spine", "Head"]);
        assert_eq!(names(&scene, "Atom1", "^H"), vec!["Hip", "Head"]);
    }

    #[test]
    fn match_all_keeps_traversal_order() {
        let scene = make_scene("Atom1", &["Hip", "Spine", "Head"]);
        assert_eq!(names(&scene, "Atom1", ".*"), vec!["Hip", "Spine", "Head"]);
        assert_eq!(names(&scene, "Atom1", ""), vec!["Hip", "Spine", "Head"]);
    }

    #[test]
    fn unanchored_pattern_matches_anywhere_in_name() {
        let scene = make_scene("Atom1", &["LeftHand", "RightHand", "Head"]);
        assert_eq!(names(&scene, "Atom1", "Hand"), vec!["LeftHand", "RightHand"]);
    }

    #[test]
    fn malformed_pattern_is_a_validation_error() {
        match TargetFilter::new("[Hip") {
            Err(LinkError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "[Hip"),
            other => panic!("expected InvalidPattern, got {:?}", other.map(|_| ())),
        }
    }

    // -----------------------------------------------------------------------
    // Naming
    // -----------------------------------------------------------------------

    #[test]
    fn targets_carry_namespaced_control_ids() {
        let scene = make_scene("Atom1", &["Hip"]);
        let prefix = ScopePrefix::for_owner("Atom1");
        let filter = TargetFilter::default();
        let targets: Vec<_> = control_targets(&scene, "Atom1", SUBPATH, &prefix, &filter).collect();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].control_id.as_str(), "z$Atom1::Hip::Control");
    }

    // -----------------------------------------------------------------------
    // Missing asset
    // -----------------------------------------------------------------------

    #[test]
    fn missing_asset_yields_nothing() {
        let scene = MemoryScene::new();
        assert!(names(&scene, "Atom1", ".*").is_empty());
    }

    #[test]
    fn wrong_subpath_yields_nothing() {
        let scene = MemoryScene::new();
        scene.add_asset(
            "Atom1",
            "object",
            [(
                "Hip",
                BodyState {
                    transform: Transform::default(),
                    mass: 1.0,
                },
            )],
        );
        assert!(names(&scene, "Atom1", ".*").is_empty());
    }

    #[test]
    fn other_owners_assets_are_invisible() {
        let scene = make_scene("Atom2", &["Hip"]);
        assert!(names(&scene, "Atom1", ".*").is_empty());
        assert_eq!(names(&scene, "Atom2", ".*"), vec!["Hip"]);
    }
}
