// ==========================================
// 配置层集成测试
// ==========================================
// 测试目标: 旧表迁移 → 分级覆写 → 物料需求重算
// ==========================================

mod test_helpers;

use cabinet_risk_engine::config::{config_keys, migrate_legacy_global_settings, ConfigScope};
use cabinet_risk_engine::domain::{DeviationType, RiskSettingsOverride};
use cabinet_risk_engine::repository::{DeviationRepository, ProjectRepository};
use test_helpers::TestContext;

fn required_qty(ctx: &TestContext, code: &str) -> f64 {
    ctx.projects
        .list_material_requirements("P1")
        .unwrap()
        .into_iter()
        .find(|r| r.material_code == code)
        .map(|r| r.required_qty)
        .unwrap()
}

#[tokio::test]
async fn test_migrated_waste_factor_drives_requirements() {
    let ctx = TestContext::new();
    {
        let conn = ctx.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE shop_settings (waste_factor REAL, shop_name TEXT);
            INSERT INTO shop_settings VALUES (2.0, 'north');
            "#,
        )
        .unwrap();
        assert_eq!(migrate_legacy_global_settings(&conn).unwrap(), 1);
    }
    assert_eq!(
        ctx.config
            .get_value(&ConfigScope::Global, config_keys::RISK_WASTE_FACTOR)
            .unwrap()
            .as_deref(),
        Some("2")
    );

    ctx.seed_project("P1", "kitchen");
    ctx.set_parts("P1", &[(96.0, 48.0, 4.0, "MDF18")]);
    let orchestrator = ctx.orchestrator();

    orchestrator.on_project_changed("P1").await;
    assert_eq!(required_qty(&ctx, "MDF18"), 8.0);

    // 单项目覆写优先于全局
    let scope = ConfigScope::Project {
        project_id: "P1".to_string(),
    };
    ctx.config
        .set_risk_override(
            &scope,
            &RiskSettingsOverride {
                waste_factor: Some(1.0),
                ..Default::default()
            },
        )
        .unwrap();
    let report = orchestrator.on_settings_changed(&scope).await;
    assert!(report.is_success());
    assert_eq!(required_qty(&ctx, "MDF18"), 4.0);

    let snapshot: serde_json::Value =
        serde_json::from_str(&ctx.config.get_config_snapshot().unwrap()).unwrap();
    assert_eq!(snapshot["global"][config_keys::RISK_WASTE_FACTOR], "2");
    assert_eq!(snapshot["project:P1"][config_keys::RISK_WASTE_FACTOR], "1");
}

#[test]
fn test_migration_skipped_when_global_scope_configured() {
    let ctx = TestContext::new();
    ctx.config
        .set_value(&ConfigScope::Global, config_keys::RISK_TARGET_MARGIN, "0.3")
        .unwrap();

    let conn = ctx.conn.lock().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE global_risk_settings (target_margin REAL, waste_factor REAL);
        INSERT INTO global_risk_settings VALUES (0.5, 1.4);
        "#,
    )
    .unwrap();
    assert_eq!(migrate_legacy_global_settings(&conn).unwrap(), 0);
}

#[tokio::test]
async fn test_out_of_range_waste_factor_never_reaches_requirements() {
    let ctx = TestContext::new();
    ctx.seed_project("P1", "kitchen");
    ctx.set_parts("P1", &[(96.0, 48.0, 8.0, "MDF18")]);

    let zero = RiskSettingsOverride {
        waste_factor: Some(0.0),
        ..Default::default()
    };
    assert!(ctx
        .config
        .set_risk_override(&ConfigScope::Global, &zero)
        .is_err());

    // 直接写库的越界值在读取时忽略，回落到默认 1.15
    ctx.config
        .set_value(&ConfigScope::Global, config_keys::RISK_WASTE_FACTOR, "0")
        .unwrap();
    ctx.orchestrator().on_project_changed("P1").await;

    assert_eq!(required_qty(&ctx, "MDF18"), 10.0);
    assert!(ctx
        .deviations
        .find_open(Some("P1"), DeviationType::InventoryShortage, "MDF18")
        .unwrap()
        .is_some());
}
