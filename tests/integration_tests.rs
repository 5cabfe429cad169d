//! Integration tests for the source patch engine.

use assert_cmd::Command;
use predicates::prelude::*;
use source_patch::lexer;
use source_patch::prelude::*;
use source_patch::rule::check_anchors;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const UNRECOVERED_JS: &str = "try {\n  risky();\n}\n";

struct Stub(bool);

impl Validator for Stub {
    fn name(&self) -> &str {
        "stub"
    }

    fn validate(&self, _path: &Path) -> source_patch::error::Result<Validation> {
        Ok(if self.0 {
            Validation::pass("No syntax errors detected")
        } else {
            Validation::fail("SyntaxError: Unexpected token")
        })
    }
}

fn stub_validators(passes: bool) -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new();
    for ext in ["php", "js"] {
        registry.register(ext, Box::new(Stub(passes)));
    }
    registry
}

fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(&path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
    path.canonicalize().unwrap()
}

fn project() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn statuses(result: &RunResult) -> Vec<Status> {
    result.report.results.iter().map(|r| r.status).collect()
}

#[test]
fn test_guard_scenario() {
    let rule = CsrfGuard::new();
    let file = SourceFile::new("endpoint.php", "<?php\nfoo();\n");
    let anchor = rule.locate(&file).unwrap();
    let out = rule.transform(&file, &anchor);

    assert_eq!(
        out,
        "<?php\nrequire_once 'backend/includes/csrf_check.php';\ncsrf_check(true);\n\nfoo();\n"
    );
}

#[test]
fn test_brace_matching_ignores_string_contents() {
    let content = "try { let s = \"a } b\"; } ";
    let open = content.find('{').unwrap();
    assert_eq!(lexer::find_matching_close(content, open), content.rfind('}'));
}

#[test]
fn test_recovery_is_idempotent() {
    let (_dir, root) = project();
    let file = write_file(&root, "app.js", UNRECOVERED_JS);

    let first = Patcher::in_dir(&root)
        .rule("recovery-clause")
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();
    assert_eq!(statuses(&first), vec![Status::Modified]);

    let patched = fs::read_to_string(&file).unwrap();
    assert!(patched.starts_with("try {\n  risky();\n} catch (e) {\n"));
    assert!(patched.contains("console.error('Auto-inserted recovery clause:', e);"));

    let second = Patcher::in_dir(&root)
        .rule("recovery-clause")
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();
    assert_eq!(statuses(&second), vec![Status::SkippedAlreadyApplied]);
    assert_eq!(fs::read_to_string(&file).unwrap(), patched);
    assert!(second.changes.is_empty());
}

#[test]
fn test_backup_matches_original() {
    let (_dir, root) = project();
    let original = "<?php\nif ($_POST['save']) {\n  persist();\n}\n";
    let file = write_file(&root, "backend/api/save.php", original);

    let result = Patcher::in_dir(&root)
        .rule("csrf-guard")
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();

    let entry = &result.report.results[0];
    assert_eq!(entry.status, Status::Modified);
    let backup = entry.backup.clone().unwrap();
    assert_eq!(backup, PathBuf::from(format!("{}.bak", file.display())));
    assert_eq!(fs::read(&backup).unwrap(), original.as_bytes());
    assert!(fs::read_to_string(&file).unwrap().contains("csrf_check(true);"));
}

#[test]
fn test_dry_run_is_pure_and_repeatable() {
    let (_dir, root) = project();
    let js = write_file(&root, "app.js", UNRECOVERED_JS);
    let php = write_file(&root, "backend/api/form.php", "<?php\n$v = $_POST['v'];\n");
    let before_js = fs::metadata(&js).unwrap().modified().unwrap();
    let before_php = fs::metadata(&php).unwrap().modified().unwrap();

    let run = || {
        Patcher::in_dir(&root)
            .rules(["csrf-guard", "recovery-clause"])
            .validators(stub_validators(true))
            .dry_run()
            .run()
            .unwrap()
    };
    let first = run();
    let second = run();

    assert_eq!(first.report.results, second.report.results);
    assert_eq!(first.report.summary().count(Status::CandidateDryrun), 2);
    assert!(!first.report.meta.apply);
    assert!(first.report.meta.dry_run);
    assert!(first.gate.is_none());

    assert_eq!(fs::read_to_string(&js).unwrap(), UNRECOVERED_JS);
    assert_eq!(fs::read_to_string(&php).unwrap(), "<?php\n$v = $_POST['v'];\n");
    assert_eq!(fs::metadata(&js).unwrap().modified().unwrap(), before_js);
    assert_eq!(fs::metadata(&php).unwrap().modified().unwrap(), before_php);
    assert_eq!(fs::read_dir(&root).unwrap().count(), 2);
}

#[test]
fn test_anchors_never_inside_strings_or_comments() {
    let (_dir, root) = project();
    let samples = [
        (
            "frontend/js/app.js",
            "const s = \"try { x }\";\n/* try { y } */\ntry {\n  run(\"}\");\n}\n",
        ),
        (
            "backend/api/form.php",
            "<?php\n$name = $_POST['name'] ?? '';\n?>\n<p>Don't leave it blank</p>\n<form method=\"post\">\n  <label for=\"nm\">Name</label>\n  <input type=\"text\" name=\"name\">\n  <img src=\"logo.png\">\n</form>\n",
        ),
        (
            "frontend/page.html",
            "<p>It's a \"quote</p>\n<div class=\"try {\">\n  <label for=\"q\">Query</label>\n  <select name=\"q\"></select>\n</div>\n<script>\ntry { go('}'); }\n</script>\n",
        ),
    ];

    let registry = RuleRegistry::new(&RuleSettings::default(), &root).unwrap();
    let mut checked = 0;
    for (name, content) in samples {
        let file = SourceFile::new(root.join(name), content);
        let mut code = file.code_map();
        for rule in registry.all() {
            if !rule.applies_to(&file.path) || !rule.detect(&file) || rule.already_applied(&file) {
                continue;
            }
            let anchors = rule.locate_all(&file);
            for anchor in anchors.iter().filter(|a| !a.tag.is_markup()) {
                assert!(
                    code.is_code(anchor.start),
                    "{} anchor {} in {} lies outside code",
                    rule.id(),
                    anchor.start,
                    name
                );
            }
            checked += anchors.len();
            assert!(
                check_anchors(&file, &anchors).is_ok(),
                "{} anchors in {} rejected",
                rule.id(),
                name
            );
        }
    }
    assert!(checked >= 8);
}

#[test]
fn test_apostrophes_in_page_text_do_not_block_rules() {
    let (_dir, root) = project();
    let file = write_file(
        &root,
        "backend/api/contact.php",
        "<p>Don't forget to save</p>\n<?php\nif ($_POST['x']) { save(); }\n?>\n<form method=\"post\">\n  <img src=\"a.png\">\n</form>\n<p>That's it</p>\n",
    );

    let result = Patcher::in_dir(&root)
        .rules(["csrf-guard", "img-alt", "form-csrf-token"])
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();

    assert_eq!(
        statuses(&result),
        vec![Status::Modified, Status::Modified, Status::Modified]
    );
    let content = fs::read_to_string(&file).unwrap();
    assert!(content.contains("csrf_check(true);"));
    assert!(content.contains("<img src=\"a.png\" alt=\"TODO: add alt text\">"));
    assert!(content.contains("name=\"csrf_token\""));
}

#[test]
fn test_default_run_stays_in_scope() {
    let (_dir, root) = project();
    let endpoint = write_file(&root, "backend/api/users.php", "<?php\n$a = $_POST['a'];\n");
    let library_src = "<?php\nnamespace App\\Forms;\n\nfunction read() { return $_POST['b']; }\n";
    let library = write_file(&root, "lib/Forms.php", library_src);
    let repo_src = "<?php\nnamespace App\\Dashboard;\n\nclass Repo {}\n";
    let repo = write_file(&root, "backend/dashboard/Repo.php", repo_src);
    let page = write_file(&root, "backend/dashboard/home.php", "<main>Hi</main>\n");

    let result = Patcher::in_dir(&root)
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();

    assert!(!result.report.meta.rules.iter().any(|r| r == "api-bootstrap-include"));
    assert_eq!(fs::read_to_string(&library).unwrap(), library_src);
    assert_eq!(fs::read_to_string(&repo).unwrap(), repo_src);

    let endpoint = fs::read_to_string(&endpoint).unwrap();
    assert!(endpoint.contains("csrf_check(true);"));
    assert!(endpoint.contains("define('API_BOOTSTRAP_V1', true);"));
    assert!(!endpoint.contains("api_bootstrap.php"));
    assert!(fs::read_to_string(&page).unwrap().starts_with("<?php include_once"));
}

#[test]
fn test_partial_fix_is_reported_once_for_review() {
    let (_dir, root) = project();
    let original = "try { a(); }\ntry { b();\n";
    let file = write_file(&root, "app.js", original);

    for _ in 0..2 {
        let result = Patcher::in_dir(&root)
            .rule("recovery-clause")
            .validators(stub_validators(true))
            .apply_changes()
            .run()
            .unwrap();
        assert_eq!(statuses(&result), vec![Status::ManualReviewRequired]);
        assert_eq!(fs::read_to_string(&file).unwrap(), original);
    }
}

#[test]
fn test_label_scenario() {
    let (_dir, root) = project();
    let file = write_file(
        &root,
        "signup.html",
        "<form>\n  <label for=\"x\">Name</label>\n  <br>\n  <input type=\"text\" name=\"name\">\n</form>\n",
    );

    let result = Patcher::in_dir(&root)
        .rule("label-for")
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();

    assert_eq!(statuses(&result), vec![Status::Modified]);
    assert_eq!(result.report.results[0].anchors, vec!["next-sibling-control"]);
    let content = fs::read_to_string(&file).unwrap();
    assert!(content.contains("<input type=\"text\" name=\"name\" id=\"x\">"));
    assert!(content.contains("<!-- Fixed label-for/id mismatch for accessibility -->"));
}

#[test]
fn test_failing_validator_restores_original() {
    let (_dir, root) = project();
    let file = write_file(&root, "app.js", UNRECOVERED_JS);

    let result = Patcher::in_dir(&root)
        .rule("recovery-clause")
        .validators(stub_validators(false))
        .apply_changes()
        .run()
        .unwrap();

    let entry = &result.report.results[0];
    assert_eq!(entry.status, Status::ValidationFailed);
    assert!(entry.diagnostic.as_ref().unwrap().contains("SyntaxError"));
    let backup = entry.backup.clone().unwrap();
    assert_eq!(fs::read_to_string(&backup).unwrap(), UNRECOVERED_JS);
    assert_eq!(fs::read_to_string(&file).unwrap(), UNRECOVERED_JS);
    assert_eq!(result.exit_code(), 1);
}

#[test]
fn test_failing_validator_without_restore_keeps_patch() {
    let (_dir, root) = project();
    let file = write_file(&root, "app.js", UNRECOVERED_JS);

    let result = Patcher::in_dir(&root)
        .configure(|c| EngineConfig {
            restore_on_failure: false,
            ..c
        })
        .rule("recovery-clause")
        .validators(stub_validators(false))
        .apply_changes()
        .run()
        .unwrap();

    let entry = &result.report.results[0];
    assert_eq!(entry.status, Status::ValidationFailed);
    assert_eq!(fs::read_to_string(entry.backup.as_ref().unwrap()).unwrap(), UNRECOVERED_JS);
    assert!(fs::read_to_string(&file).unwrap().contains("catch (e)"));
}

#[test]
fn test_one_failure_does_not_stop_other_files() {
    let (_dir, root) = project();
    write_file(&root, "a.js", UNRECOVERED_JS);
    write_file(&root, "b.php", "<?php\ntry {\n  work();\n}\n");

    let mut validators = ValidatorRegistry::new();
    validators.register("js", Box::new(Stub(false)));
    validators.register("php", Box::new(Stub(true)));

    let result = Patcher::in_dir(&root)
        .rule("recovery-clause")
        .validators(validators)
        .apply_changes()
        .run()
        .unwrap();

    assert_eq!(
        statuses(&result),
        vec![Status::ValidationFailed, Status::Modified]
    );
    let php = fs::read_to_string(root.join("b.php")).unwrap();
    assert!(php.contains("} catch (\\Throwable $e) {"));
    assert!(result.gate.as_ref().unwrap().passed());
    assert_eq!(result.exit_code(), 1);
}

#[test]
fn test_excluded_directories_are_skipped() {
    let (_dir, root) = project();
    let vendored = write_file(&root, "node_modules/lib/index.js", UNRECOVERED_JS);
    write_file(&root, "src/app.js", UNRECOVERED_JS);
    write_file(&root, "src/legacy.js", UNRECOVERED_JS);

    let result = Patcher::in_dir(&root)
        .configure(|mut c| {
            c.exclude.push("**/legacy.js".to_string());
            c
        })
        .rule("recovery-clause")
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();

    let paths: Vec<&PathBuf> = result.report.results.iter().map(|r| &r.path).collect();
    assert_eq!(paths, vec![&root.join("src/app.js")]);
    assert_eq!(fs::read_to_string(&vendored).unwrap(), UNRECOVERED_JS);

    // a second walk never picks up the backup
    let again = Patcher::in_dir(&root)
        .configure(|c| EngineConfig {
            extensions: vec!["js".to_string(), "bak".to_string()],
            ..c
        })
        .rule("recovery-clause")
        .validators(stub_validators(true))
        .dry_run()
        .run()
        .unwrap();
    assert!(again
        .report
        .results
        .iter()
        .all(|r| !r.path.to_string_lossy().ends_with(".bak")));
}

#[test]
fn test_input_report_redrives_candidates() {
    let (_dir, root) = project();
    let endpoint = write_file(
        &root,
        "backend/api/users.php",
        "<?php\nsession_start();\necho json_encode([]);\n",
    );
    write_file(&root, "backend/api/static.php", "<html></html>\n");

    let first = Patcher::in_dir(&root)
        .rule("api-bootstrap")
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();
    assert_eq!(first.report.modified_paths(), vec![endpoint.clone()]);

    let report_path = root.join("reports/pass1.json");
    first.report.save(&report_path).unwrap();
    let prior = RunReport::load(&report_path).unwrap();

    let second = Patcher::in_dir(&root)
        .rule("api-bootstrap-include")
        .from_report(&prior)
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();

    assert_eq!(statuses(&second), vec![Status::Modified]);
    assert_eq!(
        fs::read_to_string(&endpoint).unwrap(),
        "<?php\nrequire_once __DIR__ . '/../includes/api_bootstrap.php';\n\nsession_start();\necho json_encode([]);\n"
    );
}

#[test]
fn test_lint_report_revalidates_modified_files() {
    let (_dir, root) = project();
    write_file(&root, "app.js", UNRECOVERED_JS);

    let result = Patcher::in_dir(&root)
        .rule("recovery-clause")
        .validators(stub_validators(true))
        .apply_changes()
        .run()
        .unwrap();
    let gate = result.gate.as_ref().unwrap();
    assert_eq!(gate.checked, 1);
    assert!(gate.passed());

    let failing = lint_report(&result.report, &stub_validators(false));
    assert_eq!(failing.checked, 1);
    assert_eq!(failing.failures.len(), 1);
    assert!(!failing.passed());
}

#[test]
fn test_registry_written_only_by_apply() {
    let (_dir, root) = project();
    write_file(&root, "app.js", UNRECOVERED_JS);
    let registry = root.join("reports/state.registry.json");

    let run = |mode: RunMode| {
        Patcher::in_dir(&root)
            .rule("recovery-clause")
            .registry(&registry)
            .validators(stub_validators(true))
            .mode(mode)
            .run()
            .unwrap()
    };

    run(RunMode::DryRun);
    assert!(!registry.exists());

    run(RunMode::Apply);
    let loaded = ProcessedRegistry::load(&registry).unwrap();
    assert_eq!(loaded.len(), 1);

    let again = run(RunMode::Apply);
    assert_eq!(statuses(&again), vec![Status::SkippedAlreadyApplied]);
    assert_eq!(
        again.report.results[0].diagnostic.as_deref(),
        Some("content recorded in processed registry")
    );
}

#[test]
fn test_report_file_shape() {
    let (_dir, root) = project();
    write_file(&root, "app.js", UNRECOVERED_JS);

    let result = Patcher::in_dir(&root)
        .rule("recovery-clause")
        .validators(stub_validators(true))
        .dry_run()
        .run()
        .unwrap();
    let path = root.join("out/report.json");
    result.report.save(&path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["meta"]["dryRun"], true);
    assert_eq!(json["meta"]["apply"], false);
    assert!(json["meta"]["timestamp"].is_string());
    let entry = &json["results"][0];
    assert_eq!(entry["status"], "candidate_dryrun");
    assert!(entry["backup"].is_null());
    assert!(entry["diagnostic"].is_null());
    assert!(entry["preview"].as_str().unwrap().contains("[+ catch (e) {"));
}

#[test]
fn test_cli_requires_a_mode() {
    Command::cargo_bin("srcpatch")
        .unwrap()
        .arg("run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--dry-run"));
}

#[test]
fn test_cli_unreadable_report_is_usage_error() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("srcpatch")
        .unwrap()
        .current_dir(dir.path())
        .args(["lint", "missing.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read report"));
}

#[test]
fn test_cli_dry_run_writes_report() {
    let (_dir, root) = project();
    write_file(&root, "src/app.js", UNRECOVERED_JS);

    Command::cargo_bin("srcpatch")
        .unwrap()
        .current_dir(&root)
        .args(["run", "--dry-run", "--rule", "recovery-clause", "--root", "src"])
        .assert()
        .success()
        .stdout(predicate::str::contains("candidate_dryrun"))
        .stdout(predicate::str::contains("Report written to"));

    let report = RunReport::load(root.join("reports/srcpatch_report.json")).unwrap();
    assert_eq!(report.summary().count(Status::CandidateDryrun), 1);
    assert_eq!(fs::read_to_string(root.join("src/app.js")).unwrap(), UNRECOVERED_JS);
}

#[test]
fn test_cli_include_glob_limits_walk() {
    let (_dir, root) = project();
    write_file(&root, "src/keep/app.js", UNRECOVERED_JS);
    write_file(&root, "src/skip/app.js", UNRECOVERED_JS);

    Command::cargo_bin("srcpatch")
        .unwrap()
        .current_dir(&root)
        .args(["run", "--dry-run", "--rule", "recovery-clause"])
        .args(["--root", "src", "--include", "keep/**"])
        .assert()
        .success();

    let report = RunReport::load(root.join("reports/srcpatch_report.json")).unwrap();
    let paths: Vec<&PathBuf> = report.results.iter().map(|r| &r.path).collect();
    assert_eq!(paths, vec![&root.join("src/keep/app.js")]);
}

#[test]
fn test_cli_single_byte_file_is_not_a_read_error() {
    let (_dir, root) = project();
    let path = root.join("backend/api/legacy.php");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"<?php\n// \xfc\xe7 notu\n$x = $_POST['x'];\n").unwrap();

    Command::cargo_bin("srcpatch")
        .unwrap()
        .current_dir(&root)
        .args(["run", "--dry-run", "--rule", "csrf-guard"])
        .assert()
        .success()
        .stdout(predicate::str::contains("candidate_dryrun"))
        .stdout(predicate::str::contains("read_error").not());
}

#[test]
fn test_cli_lists_opt_in_rules() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("srcpatch")
        .unwrap()
        .current_dir(dir.path())
        .arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("csrf-guard"))
        .stdout(predicate::str::is_match(r"api-bootstrap-include .*\(opt-in\)").unwrap());
}
