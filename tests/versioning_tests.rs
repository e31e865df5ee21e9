//! Integration tests for templates and the version graph.
//!
//! Every test runs against a fresh in-memory SQLite database.

use deploy_config_mcp::db::Database;
use deploy_config_mcp::db::compilations::CompilationInput;
use deploy_config_mcp::db::configs::{GlobalConfigInput, ModuleConfigInput, ModuleInput};
use deploy_config_mcp::error::{ErrorKind, ModelError};
use deploy_config_mcp::types::{Mapping, ProjectTemplate, Selection, VersionStatus, VersionType};

fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn template(db: &Database, root: &str) -> ProjectTemplate {
    db.create_template("payments", "Payment gateway stack", root)
        .expect("Failed to create template")
}

fn model_error(err: anyhow::Error) -> ModelError {
    err.downcast::<ModelError>()
        .expect("expected a model error")
}

mod template_tests {
    use super::*;

    #[test]
    fn create_template_starts_with_root_version() {
        let db = setup_db();
        let t = template(&db, "1.0.0");

        assert_eq!(t.versions.len(), 1);
        let root = &t.versions[0];
        assert_eq!(root.version, "1.0.0");
        assert!(root.base_version.is_none());
        assert!(!root.is_branch);
        assert_eq!(root.status, VersionStatus::Active);
    }

    #[test]
    fn create_template_rejects_blank_name() {
        let db = setup_db();
        let err = db.create_template("   ", "", "1.0.0").unwrap_err();
        assert_eq!(model_error(err).kind(), ErrorKind::Validation);
    }

    #[test]
    fn create_template_rejects_non_numeric_root() {
        let db = setup_db();
        let err = db.create_template("payments", "", "one").unwrap_err();
        assert!(matches!(model_error(err), ModelError::InvalidVersion(_)));
    }

    #[test]
    fn second_root_version_is_refused() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let err = db
            .create_initial_version(&t.id, "2.0.0", "again")
            .unwrap_err();
        assert!(matches!(model_error(err), ModelError::RootExists { .. }));
    }

    #[test]
    fn list_templates_reports_counts() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        db.create_version(&t.versions[0].id, VersionType::Minor, "", None, 2)
            .unwrap();

        let summaries = db.list_templates().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].version_count, 2);
        assert_eq!(summaries[0].latest_version.as_deref(), Some("1.1.0"));
    }

    #[test]
    fn update_template_keeps_unspecified_fields() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let updated = db.update_template(&t.id, Some("billing"), None).unwrap();
        assert_eq!(updated.name, "billing");
        assert_eq!(updated.description, "Payment gateway stack");
    }

    #[test]
    fn delete_template_removes_versions() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        db.delete_template(&t.id).unwrap();

        assert!(db.get_template(&t.id).unwrap().is_none());
        assert!(db.get_version(&t.versions[0].id).unwrap().is_none());
    }
}

mod derive_tests {
    use super::*;

    #[test]
    fn minor_bump_from_one_zero_zero() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let v = db
            .create_version(&t.versions[0].id, VersionType::Minor, "features", None, 2)
            .unwrap();

        assert_eq!(v.version, "1.1.0");
        assert_eq!(v.base_version.as_deref(), Some(t.versions[0].id.as_str()));
        assert!(!v.is_branch);
    }

    #[test]
    fn colliding_bump_moves_forward() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = &t.versions[0].id;
        db.create_version(root, VersionType::Minor, "", None, 2).unwrap();
        let second = db.create_version(root, VersionType::Minor, "", None, 2).unwrap();

        assert_eq!(second.version, "1.2.0");
    }

    #[test]
    fn hotfix_adds_fourth_component() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let v = db
            .create_version(&t.versions[0].id, VersionType::Hotfix, "", None, 2)
            .unwrap();
        assert_eq!(v.version, "1.0.0.1");
    }

    #[test]
    fn named_branch_appends_suffix() {
        let db = setup_db();
        let t = template(&db, "2.0.0");
        let v = db
            .create_version(
                &t.versions[0].id,
                VersionType::Branch,
                "login fix",
                Some("hotfix-login"),
                2,
            )
            .unwrap();

        assert_eq!(v.version, "2.0.0-hotfix-login");
        assert!(v.is_branch);
    }

    #[test]
    fn taken_branch_name_is_rejected() {
        let db = setup_db();
        let t = template(&db, "2.0.0");
        let root = &t.versions[0].id;
        db.create_version(root, VersionType::Branch, "", Some("hotfix-login"), 2)
            .unwrap();
        let err = db
            .create_version(root, VersionType::Branch, "", Some("hotfix-login"), 2)
            .unwrap_err();
        assert!(matches!(model_error(err), ModelError::AlreadyExists { .. }));
    }

    #[test]
    fn suffix_on_trunk_version_is_rejected() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = &t.versions[0].id;
        let err = db
            .create_version(root, VersionType::Minor, "", Some("x"), 2)
            .unwrap_err();
        assert!(matches!(
            model_error(err),
            ModelError::InvalidValue { ref field, .. } if field == "suffix"
        ));
        assert_eq!(db.list_versions(&t.id).unwrap().len(), 1);
    }

    #[test]
    fn unnamed_branch_gets_generated_suffix() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let v = db
            .create_version(&t.versions[0].id, VersionType::Branch, "", None, 2)
            .unwrap();

        let suffix = v.version.strip_prefix("1.0.0-").expect("branch of 1.0.0");
        assert!(!suffix.is_empty());
        assert!(v.is_branch);
    }

    #[test]
    fn versions_derived_from_a_branch_step_its_counter() {
        let db = setup_db();
        let t = template(&db, "2.0.0");
        let branch = db
            .create_version(&t.versions[0].id, VersionType::Branch, "", Some("exp"), 2)
            .unwrap();

        let first = db
            .create_version(&branch.id, VersionType::Patch, "", None, 2)
            .unwrap();
        let second = db
            .create_version(&branch.id, VersionType::Minor, "", None, 2)
            .unwrap();

        assert_eq!(first.version, "2.0.0-exp.1");
        assert_eq!(second.version, "2.0.0-exp.2");
        assert!(first.is_branch);
    }

    #[test]
    fn derived_version_is_an_isolated_clone() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();

        let global = db
            .create_global_config(
                &root,
                GlobalConfigInput {
                    name: "domain".into(),
                    default_value: "https://zhugeio.com/".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let module = db
            .add_module(
                &root,
                ModuleInput {
                    project_id: "web".into(),
                    project_name: "Web".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        db.create_module_config(
            &module.id,
            ModuleConfigInput {
                name: "api.url".into(),
                file_location: "config/app.yml".into(),
                mapping: Mapping::Global(global.id.clone()),
                regex: String::new(),
                description: String::new(),
                is_hidden: false,
                is_selected: true,
            },
        )
        .unwrap();

        let child = db
            .create_version(&root, VersionType::Minor, "", None, 2)
            .unwrap();

        assert_eq!(child.global_configs.len(), 1);
        let cloned_global = &child.global_configs[0];
        assert_ne!(cloned_global.id, global.id);
        assert_eq!(cloned_global.default_value, "https://zhugeio.com/");

        let cloned_config = &child.modules[0].configs[0];
        assert_eq!(
            cloned_config.mapping,
            Mapping::Global(cloned_global.id.clone())
        );

        // Editing the child leaves the base untouched.
        db.update_global_config(
            &cloned_global.id,
            deploy_config_mcp::db::configs::GlobalConfigPatch {
                default_value: Some("https://other.example".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let base = db.get_version(&root).unwrap().unwrap();
        assert_eq!(base.global_configs[0].default_value, "https://zhugeio.com/");
    }
}

mod delete_tests {
    use super::*;

    #[test]
    fn last_version_cannot_be_deleted() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let err = db
            .delete_version(&t.versions[0].id, &Selection::default())
            .unwrap_err();
        assert!(matches!(model_error(err), ModelError::LastVersion { .. }));
    }

    #[test]
    fn deleting_middle_version_reparents_children() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();
        let middle = db.create_version(&root, VersionType::Minor, "", None, 2).unwrap();
        let leaf = db.create_version(&middle.id, VersionType::Patch, "", None, 2).unwrap();

        db.delete_version(&middle.id, &Selection::default()).unwrap();

        let leaf = db.get_version(&leaf.id).unwrap().unwrap();
        assert_eq!(leaf.base_version.as_deref(), Some(root.as_str()));
    }

    #[test]
    fn deleting_root_promotes_first_child() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();
        let first = db.create_version(&root, VersionType::Minor, "", None, 2).unwrap();
        let second = db.create_version(&root, VersionType::Major, "", None, 2).unwrap();

        db.delete_version(&root, &Selection::default()).unwrap();

        let first = db.get_version(&first.id).unwrap().unwrap();
        let second = db.get_version(&second.id).unwrap().unwrap();
        assert!(first.base_version.is_none());
        assert_eq!(second.base_version.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn deleting_root_skips_earlier_branch_child() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();
        let branch = db
            .create_version(&root, VersionType::Branch, "", Some("exp"), 2)
            .unwrap();
        let trunk = db.create_version(&root, VersionType::Minor, "", None, 2).unwrap();

        db.delete_version(&root, &Selection::default()).unwrap();

        let trunk = db.get_version(&trunk.id).unwrap().unwrap();
        let branch = db.get_version(&branch.id).unwrap().unwrap();
        assert!(trunk.base_version.is_none());
        assert!(!trunk.is_branch);
        assert_eq!(branch.base_version.as_deref(), Some(trunk.id.as_str()));
        assert!(branch.is_branch);

        let patch = db.create_version(&trunk.id, VersionType::Patch, "", None, 2).unwrap();
        assert_eq!(patch.version, "1.1.1");
        assert!(!patch.is_branch);
    }

    #[test]
    fn deleting_selected_version_moves_selection_to_last_remaining() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();
        let a = db.create_version(&root, VersionType::Minor, "", None, 2).unwrap();
        let b = db.create_version(&root, VersionType::Major, "", None, 2).unwrap();

        let selection = Selection {
            version_id: Some(b.id.clone()),
            module_id: Some("some-module".into()),
        };
        let next = db.delete_version(&b.id, &selection).unwrap();
        assert_eq!(next.version_id.as_deref(), Some(a.id.as_str()));
        assert!(next.module_id.is_none());

        // An unrelated selection is returned unchanged.
        let untouched = Selection::version(root.clone());
        let next = db.delete_version(&a.id, &untouched).unwrap();
        assert_eq!(next, untouched);
    }

    #[test]
    fn version_with_compilations_is_in_use() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();
        db.create_version(&root, VersionType::Minor, "", None, 2).unwrap();

        let customer = db.create_customer("acme", "").unwrap();
        let env = db.create_environment(&customer.id, "prod", "").unwrap();
        db.create_compilation(CompilationInput {
            name: "acme prod".into(),
            version_id: root.clone(),
            customer_id: customer.id,
            environment_id: env.id,
        })
        .unwrap();

        let err = db.delete_version(&root, &Selection::default()).unwrap_err();
        assert!(matches!(model_error(err), ModelError::InUse { .. }));
    }
}

mod graph_tests {
    use super::*;

    #[test]
    fn first_child_continues_lineage() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();
        let trunk = db.create_version(&root, VersionType::Minor, "", None, 2).unwrap();
        let branch = db
            .create_version(&root, VersionType::Branch, "", Some("exp"), 2)
            .unwrap();

        let rows = db.version_graph(&t.id).unwrap();
        let lineage_of = |id: &str| rows.iter().find(|r| r.version_id == id).unwrap().lineage;

        assert_eq!(lineage_of(&root), lineage_of(&trunk.id));
        assert_ne!(lineage_of(&root), lineage_of(&branch.id));
    }

    #[test]
    fn merge_preview_lists_changes_without_applying() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let root = t.versions[0].id.clone();
        let child = db.create_version(&root, VersionType::Minor, "", None, 2).unwrap();
        db.create_global_config(
            &child.id,
            GlobalConfigInput {
                name: "region".into(),
                default_value: "eu-west-1".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let preview = db.merge_version(&child.id).unwrap();
        assert!(!preview.applied);
        assert_eq!(preview.target_id, root);
        assert!(preview.changes.iter().any(|c| c.key == "region"));

        let base = db.get_version(&root).unwrap().unwrap();
        assert!(base.global_configs.is_empty());
    }

    #[test]
    fn root_has_nothing_to_merge_into() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let err = db.merge_version(&t.versions[0].id).unwrap_err();
        assert!(matches!(model_error(err), ModelError::NoBaseVersion { .. }));
    }

    #[test]
    fn status_change_round_trips() {
        let db = setup_db();
        let t = template(&db, "1.0.0");
        let v = db
            .set_version_status(&t.versions[0].id, VersionStatus::Deprecated)
            .unwrap();
        assert_eq!(v.status, VersionStatus::Deprecated);
    }
}
