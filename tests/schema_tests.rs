//! Integration tests for global configs, modules and module configs.

use deploy_config_mcp::db::Database;
use deploy_config_mcp::db::configs::{
    GlobalConfigInput, GlobalConfigPatch, ModuleConfigInput, ModuleConfigPatch, ModuleInput,
};
use deploy_config_mcp::error::{ErrorKind, ModelError};
use deploy_config_mcp::types::{GlobalConfig, Mapping, MappingType, TemplateModule};

fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

/// Database with one template and the id of its root version.
fn setup_version() -> (Database, String) {
    let db = setup_db();
    let t = db
        .create_template("analytics", "", "1.0.0")
        .expect("Failed to create template");
    let root = t.versions[0].id.clone();
    (db, root)
}

fn add_global(db: &Database, version_id: &str, name: &str, default: &str) -> GlobalConfig {
    db.create_global_config(
        version_id,
        GlobalConfigInput {
            name: name.into(),
            default_value: default.into(),
            ..Default::default()
        },
    )
    .expect("Failed to create global config")
}

fn add_module(db: &Database, version_id: &str, project_id: &str) -> TemplateModule {
    db.add_module(
        version_id,
        ModuleInput {
            project_id: project_id.into(),
            project_name: project_id.to_uppercase(),
            project_version: "3.2.1".into(),
            ..Default::default()
        },
    )
    .expect("Failed to add module")
}

fn config_input(name: &str, mapping: Mapping) -> ModuleConfigInput {
    ModuleConfigInput {
        name: name.into(),
        file_location: "conf/app.properties".into(),
        mapping,
        regex: String::new(),
        description: String::new(),
        is_hidden: false,
        is_selected: true,
    }
}

fn model_error(err: anyhow::Error) -> ModelError {
    err.downcast::<ModelError>().expect("expected a model error")
}

mod global_tests {
    use super::*;

    #[test]
    fn create_and_list_globals() {
        let (db, version) = setup_version();
        add_global(&db, &version, "domain", "https://zhugeio.com/");
        add_global(&db, &version, "region", "cn-north");

        let globals = db.list_global_configs(&version).unwrap();
        assert_eq!(globals.len(), 2);
        assert!(globals.iter().any(|g| g.name == "domain"));
    }

    #[test]
    fn update_global_patches_only_given_fields() {
        let (db, version) = setup_version();
        let g = add_global(&db, &version, "domain", "https://zhugeio.com/");

        let updated = db
            .update_global_config(
                &g.id,
                GlobalConfigPatch {
                    is_hidden: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.is_hidden);
        assert_eq!(updated.default_value, "https://zhugeio.com/");
        assert_eq!(updated.name, "domain");
    }

    #[test]
    fn global_in_use_cannot_be_deleted() {
        let (db, version) = setup_version();
        let g = add_global(&db, &version, "domain", "x");
        let m = add_module(&db, &version, "web");
        db.create_module_config(&m.id, config_input("api.url", Mapping::Global(g.id.clone())))
            .unwrap();

        assert_eq!(db.global_usage_count(&g.id).unwrap(), 1);
        let err = db.delete_global_config(&g.id).unwrap_err();
        let err = model_error(err);
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert!(matches!(err, ModelError::InUse { count: 1, .. }));
    }

    #[test]
    fn unused_global_can_be_deleted() {
        let (db, version) = setup_version();
        let g = add_global(&db, &version, "domain", "x");
        db.delete_global_config(&g.id).unwrap();
        assert!(db.list_global_configs(&version).unwrap().is_empty());
    }

    #[test]
    fn usage_of_missing_global_is_not_found() {
        let (db, _) = setup_version();
        let err = db.global_usage_count("nope").unwrap_err();
        assert_eq!(model_error(err).kind(), ErrorKind::NotFound);
    }
}

mod module_tests {
    use super::*;

    #[test]
    fn project_appears_once_per_version() {
        let (db, version) = setup_version();
        add_module(&db, &version, "web");
        let err = db
            .add_module(
                &version,
                ModuleInput {
                    project_id: "web".into(),
                    project_name: "Web again".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(model_error(err), ModelError::AlreadyExists { .. }));
    }

    #[test]
    fn remove_module_drops_its_configs() {
        let (db, version) = setup_version();
        let m = add_module(&db, &version, "web");
        db.create_module_config(&m.id, config_input("port", Mapping::Fixed("8080".into())))
            .unwrap();

        db.remove_module(&m.id).unwrap();
        assert!(db.list_modules(&version).unwrap().is_empty());
    }

    #[test]
    fn module_configs_come_back_with_their_module() {
        let (db, version) = setup_version();
        let m = add_module(&db, &version, "web");
        db.create_module_config(&m.id, config_input("port", Mapping::Fixed("8080".into())))
            .unwrap();
        db.create_module_config(&m.id, config_input("secret", Mapping::Manual))
            .unwrap();

        let modules = db.list_modules(&version).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].configs.len(), 2);
        assert_eq!(modules[0].project_version, "3.2.1");
    }
}

mod module_config_tests {
    use super::*;

    #[test]
    fn global_mapping_must_name_a_global_of_the_same_version() {
        let (db, version) = setup_version();
        let m = add_module(&db, &version, "web");
        let err = db
            .create_module_config(&m.id, config_input("api.url", Mapping::Global("missing".into())))
            .unwrap_err();
        assert!(matches!(
            model_error(err),
            ModelError::DanglingReference { .. }
        ));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let (db, version) = setup_version();
        let m = add_module(&db, &version, "web");
        let mut input = config_input("port", Mapping::Manual);
        input.regex = "([0-9".into();
        let err = db.create_module_config(&m.id, input).unwrap_err();
        assert_eq!(model_error(err).kind(), ErrorKind::Validation);
    }

    #[test]
    fn mapping_value_alone_keeps_mapping_kind() {
        let (db, version) = setup_version();
        let m = add_module(&db, &version, "web");
        let c = db
            .create_module_config(&m.id, config_input("port", Mapping::Fixed("8080".into())))
            .unwrap();

        let updated = db
            .update_module_config(
                &c.id,
                ModuleConfigPatch {
                    mapping_value: Some("9090".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.mapping, Mapping::Fixed("9090".into()));
    }

    #[test]
    fn switching_to_global_requires_a_value() {
        let (db, version) = setup_version();
        let m = add_module(&db, &version, "web");
        let c = db
            .create_module_config(&m.id, config_input("port", Mapping::Manual))
            .unwrap();

        let err = db
            .update_module_config(
                &c.id,
                ModuleConfigPatch {
                    mapping_type: Some(MappingType::Global),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(model_error(err).kind(), ErrorKind::Validation);
    }

    #[test]
    fn selection_toggle() {
        let (db, version) = setup_version();
        let m = add_module(&db, &version, "web");
        let c = db
            .create_module_config(&m.id, config_input("port", Mapping::Manual))
            .unwrap();
        assert!(c.is_selected);

        let c = db.set_config_selected(&c.id, false).unwrap();
        assert!(!c.is_selected);
    }

    #[test]
    fn deleting_config_frees_its_global() {
        let (db, version) = setup_version();
        let g = add_global(&db, &version, "domain", "x");
        let m = add_module(&db, &version, "web");
        let c = db
            .create_module_config(&m.id, config_input("api.url", Mapping::Global(g.id.clone())))
            .unwrap();

        db.delete_module_config(&c.id).unwrap();
        assert_eq!(db.global_usage_count(&g.id).unwrap(), 0);
        db.delete_global_config(&g.id).unwrap();
    }

    #[test]
    fn validate_version_is_clean_for_consistent_schema() {
        let (db, version) = setup_version();
        let g = add_global(&db, &version, "domain", "x");
        let m = add_module(&db, &version, "web");
        db.create_module_config(&m.id, config_input("api.url", Mapping::Global(g.id)))
            .unwrap();

        assert!(db.validate_version(&version).unwrap().is_empty());
    }
}
