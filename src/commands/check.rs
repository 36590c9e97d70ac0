//! Check command implementation.
//!
//! Validates system requirements and configuration.

use herakles_proc_cpu_collector::process::{
    CpuTimeSource, FilterDecision, GroupSpec, ProcFs, ProcessTable, CLK_TCK, NUM_CPUS,
};
use nix::unistd::geteuid;

use crate::config::{validate_effective_config, Config};

/// Validates system requirements and configuration.
pub fn command_check(verbose: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Process CPU Collector - System Check");
    println!("================================================");

    let mut all_ok = true;
    let processcpu = &config.collectors.processcpu;
    let proc_root = &processcpu.proc_root;

    // Process table
    println!("\n📁 Checking process table at {}...", proc_root.display());
    match ProcessTable::new(proc_root).processes() {
        Ok(processes) => {
            let count = processes.count();
            if count == 0 {
                println!("   ❌ No process entries found");
                all_ok = false;
            } else {
                println!("   ✅ Can list {} process entries", count);
            }
        }
        Err(e) => {
            println!("   ❌ Cannot list process table: {}", e);
            all_ok = false;
        }
    }

    if !geteuid().is_root() {
        println!("   ⚠️  Not running as root - processes of other users may be unreadable");
    }

    // CPU time sources
    println!("\n⏱️  Checking CPU time sources...");
    let source = ProcFs::new(proc_root);
    match source.system_cputime() {
        Ok(seconds) => println!("   ✅ System CPU time readable ({:.0}s)", seconds),
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }
    match source.process_cputime(std::process::id()) {
        Ok(seconds) => println!("   ✅ Process CPU time readable ({:.2}s for self)", seconds),
        Err(e) => println!("   ⚠️  Own process CPU time unreadable: {}", e),
    }
    println!("   ✅ Clock ticks per second: {}", *CLK_TCK);
    match processcpu.cpu_count {
        Some(n) if n > 0 => println!("   ✅ CPU count: {} (configured)", n),
        _ => println!("   ✅ CPU count: {} (online)", *NUM_CPUS),
    }

    // Configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    // Process groups
    println!("\n📊 Resolving process groups...");
    let (spec, report) = GroupSpec::resolve_with_report(&processcpu.process);
    if spec.is_empty() {
        println!("   ⚠️  No process groups configured");
    } else {
        let rejected = report
            .iter()
            .filter(|r| matches!(r.decision, FilterDecision::Rejected(_)))
            .count();
        println!(
            "   ✅ {} groups, {} filters ({} rejected)",
            spec.len(),
            report.len(),
            rejected
        );
        if !spec.has_matchers() {
            println!("   ⚠️  No group has a usable matcher - processcpu will publish nothing");
        }
    }

    if verbose {
        for r in &report {
            let decision = match &r.decision {
                FilterDecision::Accepted => "accepted".to_string(),
                FilterDecision::Rejected(reason) => format!("rejected: {}", reason),
                FilterDecision::UnknownKind => "ignored: unknown matcher".to_string(),
            };
            println!("   {}.{} = {} -> {}", r.group, r.kind, r.value, decision);
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
