//! Organization settings store integration tests.

use pretty_assertions::assert_eq;
use query_runners::organization::{ListSetting, OrgStore};
use tempfile::tempdir;

async fn create_test_store() -> (OrgStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = OrgStore::open(&dir.path().join("state.db")).await.unwrap();
    (store, dir)
}

#[tokio::test]
async fn test_settings_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");

    let store = OrgStore::open(&path).await.unwrap();
    store.create("Default", "default").await.unwrap();
    store
        .set_list_setting(ListSetting::GoogleAppsDomains, "example.com,example.org")
        .await
        .unwrap();
    store.close().await;

    let store = OrgStore::open(&path).await.unwrap();
    assert_eq!(
        store
            .show_list_setting(ListSetting::GoogleAppsDomains)
            .await
            .unwrap(),
        "example.com, example.org"
    );
    store.close().await;
}

#[tokio::test]
async fn test_each_setting_is_independent() {
    let (store, _dir) = create_test_store().await;
    store.create("Default", "default").await.unwrap();

    store
        .set_list_setting(ListSetting::AzureRoles, "admin, analyst")
        .await
        .unwrap();
    store
        .set_list_setting(ListSetting::AzureAppsDomains, "contoso.com")
        .await
        .unwrap();

    let org = store.first().await.unwrap();
    assert_eq!(org.list_setting(ListSetting::AzureRoles), vec!["admin", "analyst"]);
    assert_eq!(org.list_setting(ListSetting::AzureAppsDomains), vec!["contoso.com"]);
    assert!(org.list_setting(ListSetting::GoogleAppsDomains).is_empty());
    store.close().await;
}

#[tokio::test]
async fn test_overwrite_replaces_list() {
    let (store, _dir) = create_test_store().await;
    store.create("Default", "default").await.unwrap();

    store
        .set_list_setting(ListSetting::AzureRoles, "admin,analyst")
        .await
        .unwrap();
    store
        .set_list_setting(ListSetting::AzureRoles, "viewer")
        .await
        .unwrap();

    assert_eq!(
        store.show_list_setting(ListSetting::AzureRoles).await.unwrap(),
        "viewer"
    );
    store.close().await;
}

#[tokio::test]
async fn test_settings_apply_to_first_organization() {
    let (store, _dir) = create_test_store().await;
    store.create("Beta", "beta").await.unwrap();
    store.create("Alpha", "alpha").await.unwrap();

    store
        .set_list_setting(ListSetting::AzureRoles, "admin")
        .await
        .unwrap();

    let orgs = store.list().await.unwrap();
    let alpha = orgs.iter().find(|o| o.slug == "alpha").unwrap();
    let beta = orgs.iter().find(|o| o.slug == "beta").unwrap();
    assert!(alpha.list_setting(ListSetting::AzureRoles).is_empty());
    assert_eq!(beta.list_setting(ListSetting::AzureRoles), vec!["admin"]);
    store.close().await;
}

#[test]
fn test_setting_keys() {
    let keys: Vec<&str> = ListSetting::ALL.iter().map(|s| s.key()).collect();
    assert_eq!(
        keys,
        vec!["google_apps_domains", "auth_azure_apps_domains", "auth_azure_roles"]
    );
}
