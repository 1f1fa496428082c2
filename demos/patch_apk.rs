use smalipatch::collab::{ApkSigner, ArchiveTooling, CollabError, StaticAdvisor};
use smalipatch::rules::RuleSet;
use smalipatch::run::process_archive;
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::Command;

// This demo unpacks an APK file with apktool (you need this on your path),
// disables every check the default rules recognize, repacks the APK and signs
// it with uber-apk-signer. Signing trouble still leaves you a patched out.apk.

//Usage: patch_apk <apk-file>
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <apk-file>", args[0]);
        std::process::exit(1);
    }

    match patch_apk(&args[1]) {
        Ok(_) => println!("All done: written out.apk"),
        Err(e) => eprintln!("Aborted due to error: {e:?}"),
    }
}

fn patch_apk(apk_file: &str) -> Result<(), Box<dyn Error>> {
    let tooling = Apktool { work_dir: "out".to_string() };
    let report = process_archive(
        Path::new(apk_file),
        &tooling,
        Some(&UberSigner),
        Some(Box::new(StaticAdvisor)),
        RuleSet::default(),
    )?;

    println!(
        "{} of {} patches applied across {} files.",
        report.patches_applied, report.patches_attempted, report.files_scanned
    );
    for failure in &report.failures {
        println!("failed: {} ({})", failure.file.display(), failure.error);
    }
    for note in &report.recommendations {
        println!("note: {note}");
    }
    match report.signed {
        Some(true) => println!("out.apk signed."),
        Some(false) => println!("out.apk is unsigned; sign it before installing."),
        None => {}
    }
    Ok(())
}

/* apktool-backed unpack and repack */
struct Apktool {
    work_dir: String,
}

impl ArchiveTooling for Apktool {
    fn unpack(&self, archive: &Path) -> Result<PathBuf, CollabError> {
        let apk = archive.to_string_lossy();
        execute_command("apktool", &["decode", "-f", apk.as_ref(), "-o", self.work_dir.as_str()])?;
        let mut tree = PathBuf::from(&self.work_dir);
        tree.push("smali");
        Ok(tree)
    }

    fn repack(&self, _tree: &Path) -> Result<PathBuf, CollabError> {
        execute_command("apktool", &["build", self.work_dir.as_str(), "-o", "out.apk"])?;
        Ok(PathBuf::from("out.apk"))
    }
}

/* uber-apk-signer with its built-in debug key */
struct UberSigner;

impl ApkSigner for UberSigner {
    fn sign(&self, archive: &Path) -> Result<(), CollabError> {
        let apk = archive.to_string_lossy();
        execute_command("uber-apk-signer", &["--apks", apk.as_ref(), "--allowResign", "--overwrite"])?;
        Ok(())
    }
}

/* Wrapper around Command for nicer error handling */
fn execute_command(cmd: &str, args: &[&str]) -> Result<String, CollabError> {
    match Command::new(cmd).args(args).output() {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                println!("Error executing command {} {:?}", cmd, args);
                println!("Return code: {:?}", output.status);
                println!("stderr: {:?}", String::from_utf8_lossy(&output.stderr));
                Err(CollabError::Tool(format!("{cmd} returned {}", output.status)))
            }
        }
        Err(e) => {
            println!("Error executing command {} {:?}", cmd, args);
            Err(CollabError::Io(e))
        }
    }
}
