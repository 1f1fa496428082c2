use smalipatch::collab::StaticAdvisor;
use smalipatch::rules::RuleSet;
use smalipatch::run::PatchRun;
use std::env;
use std::error::Error;
use std::path::Path;

// This demo scans an already unpacked listing tree (typically the 'smali'
// folder apktool produces), disables every root / debug / entitlement check
// the default rules recognize and prints the full report as JSON.
// Try it on the RootBeer Sample app https://play.google.com/store/apps/details?id=com.scottyab.rootbeer.sample

//Usage: rootcheck <smali-folder>
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <smali-folder>", args[0]);
        std::process::exit(1);
    }

    match patch_tree(&args[1]) {
        Ok(_) => println!("All done."),
        Err(e) => eprintln!("Aborted due to error: {e:?}"),
    }
}

/* This is where all the processing takes place, to make error handling easier */
fn patch_tree(dir: &str) -> Result<(), Box<dyn Error>> {
    let mut run = PatchRun::new(RuleSet::default()).with_advisor(Box::new(StaticAdvisor));
    let report = run.execute(Path::new(dir))?;

    println!(
        "{} methods seen in {} files, {} matched a rule.",
        report.methods_seen, report.files_scanned, report.methods_classified
    );
    for (file, entries) in report.ledger.per_file() {
        for entry in entries {
            let status = if entry.applied { "patched" } else { "skipped" };
            println!(
                "{status} {}->{} [{}] in {}",
                entry.class_name,
                entry.method_name,
                entry.category,
                file.display()
            );
        }
    }
    for note in &report.recommendations {
        println!("note: {note}");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
