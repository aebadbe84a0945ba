//! CLI tests driving the `sessionmm` binary against a throwaway game folder.


use predicates::prelude::*;
use std::fs;
use test_utils::{path_arg, sessionmm_cmd, FakeGame};

#[test]
fn test_help() {
    let game = FakeGame::new();
    sessionmm_cmd(&game)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("textures"))
        .stdout(predicate::str::contains("object-count"));
}

#[test]
fn test_invalid_game_path_fails() {
    let game = FakeGame::new();
    let bogus = game.temp_dir.path().join("Nowhere");

    sessionmm_cmd(&game)
        .args(["--game-path", &path_arg(&bogus), "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Game installation not found"));
}

#[test]
fn test_missing_game_path_fails() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

// ============================================================================
// Maps
// ============================================================================

#[test]
fn test_install_list_uninstall() {
    let game = FakeGame::new();
    let source = game.create_map_source("Bowl");
    let root = path_arg(&game.root);

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No maps installed"));

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "install", &path_arg(&source)])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Installed Bowl"));

    assert!(game.has_content_file("Maps/Bowl.umap"));

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bowl"))
        .stdout(predicate::str::contains("Total: 1 map"));

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "uninstall", "Bowl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully uninstalled"));

    assert!(!game.has_content_file("Maps/Bowl.umap"));
}

#[test]
fn test_uninstall_unknown_map_fails() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .args(["--game-path", &path_arg(&game.root), "uninstall", "Ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_rename_and_hide() {
    let game = FakeGame::new();
    let root = path_arg(&game.root);
    let source = game.create_map_source("Stairs");

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "install", &path_arg(&source)])
        .assert()
        .success();

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "rename", "Stairs", "Big Stairs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Big Stairs"));

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "hide", "Stairs"])
        .assert()
        .success();

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No maps installed"));

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "list", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Big Stairs [Stairs] (hidden)"));
}

// ============================================================================
// Object count
// ============================================================================

#[test]
fn test_object_count_get_and_set() {
    let game = FakeGame::new();
    let root = path_arg(&game.root);
    let file = game.create_object_placement(&[[0x2C, 0x01], [0x2C, 0x01]]);

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "object-count", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Object count: 300"));

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "object-count", "set", "999"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Object count set to 999"))
        .stdout(predicate::str::contains("backed up"));

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "object-count", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Object count: 999"));

    let mut backup = file.clone().into_os_string();
    backup.push(".bak");
    assert!(std::path::Path::new(&backup).is_file());
}

#[test]
fn test_object_count_rejects_out_of_range() {
    let game = FakeGame::new();
    let root = path_arg(&game.root);
    let file = game.create_object_placement(&[[0x2C, 0x01]]);
    let before = fs::read(&file).unwrap();

    sessionmm_cmd(&game)
        .args(["--game-path", &root, "object-count", "set", "70000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 1 and 65535"));

    assert_eq!(fs::read(&file).unwrap(), before);
}

#[test]
fn test_object_count_without_save_file() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .args(["--game-path", &path_arg(&game.root), "object-count", "get"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Object placement file not found"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_set_game_path_is_used_by_later_commands() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .args(["config", "set-game-path", &path_arg(&game.root)])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Game path set"));

    let saved = fs::read_to_string(game.config_dir.join("config.toml")).unwrap();
    assert!(saved.contains("[game]"));

    sessionmm_cmd(&game)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No maps installed"));

    sessionmm_cmd(&game)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[downloads]"));
}

#[test]
fn test_config_set_game_path_rejects_invalid_folder() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .args(["config", "set-game-path", &path_arg(&game.sources)])
        .assert()
        .failure();

    assert!(!game.config_dir.join("config.toml").exists());
}

#[test]
fn test_download_rejects_non_http_url() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .args([
            "--game-path",
            &path_arg(&game.root),
            "download",
            "ftp://example.com/map.zip",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

// ============================================================================
// Catalog
// ============================================================================

fn subscribe_to_local_catalog(game: &FakeGame) -> std::path::PathBuf {
    let catalog = game.temp_dir.path().join("catalog.json");
    fs::write(
        &catalog,
        r#"{
            "Name": "Local",
            "Assets": [
                {
                    "ID": "bowl.zip",
                    "Name": "The Bowl",
                    "Author": "tester",
                    "Category": "Maps",
                    "Version": 1,
                    "DownloadLink": "rsmm://Url/https$example.invalid/bowl.zip"
                },
                { "ID": "deck.zip", "Name": "Red Deck", "Category": "Decks" }
            ]
        }"#,
    )
    .unwrap();

    fs::write(
        game.config_dir.join("config.toml"),
        "[catalog]\nurls = []\n",
    )
    .unwrap();

    sessionmm_cmd(game)
        .args(["catalog", "add", &path_arg(&catalog)])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Subscribed"));

    catalog
}

#[test]
fn test_catalog_list_and_filter() {
    let game = FakeGame::new();
    let catalog = subscribe_to_local_catalog(&game);

    sessionmm_cmd(&game)
        .args(["catalog", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("The Bowl [bowl.zip]"))
        .stdout(predicate::str::contains("Total: 2 asset(s)"));

    sessionmm_cmd(&game)
        .args(["catalog", "list", "--category", "decks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Red Deck"))
        .stdout(predicate::str::contains("The Bowl").not());

    sessionmm_cmd(&game)
        .args(["catalog", "remove", &path_arg(&catalog)])
        .assert()
        .success();

    sessionmm_cmd(&game)
        .args(["catalog", "remove", &path_arg(&catalog)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not subscribed"));
}

#[test]
fn test_download_unknown_catalog_asset_fails() {
    let game = FakeGame::new();
    subscribe_to_local_catalog(&game);

    sessionmm_cmd(&game)
        .args([
            "--game-path",
            &path_arg(&game.root),
            "download",
            "--asset",
            "missing.zip",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No asset 'missing.zip'"));
}

#[test]
fn test_download_asset_conflicts_with_url() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .args([
            "download",
            "https://example.com/map.zip",
            "--asset",
            "bowl.zip",
        ])
        .assert()
        .failure();
}

#[test]
fn test_completions() {
    let game = FakeGame::new();

    sessionmm_cmd(&game)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sessionmm"));
}
