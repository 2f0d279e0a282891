//! Tasks command implementation

use crate::models::Source;
use crate::pipeline::{TaskDefinition, TaskRegistry};

/// Registered tasks, optionally restricted to one source
pub fn cmd_tasks(registry: &TaskRegistry, source: Option<Source>) -> Vec<TaskDefinition> {
    match source {
        Some(source) => registry.tasks_for(source).into_iter().cloned().collect(),
        None => registry.all().to_vec(),
    }
}

/// Print tasks to console
pub fn print_tasks(tasks: &[TaskDefinition]) {
    println!("\n🧩 Extraction Tasks\n");

    if tasks.is_empty() {
        println!("No tasks registered for this source.");
        return;
    }

    for task in tasks {
        println!("• {} [{}]", task.id, task.source);
        println!("  Capability: {}", task.capability);
        println!("  Persists to: {:?}", task.persist);
        if task.needs_document {
            println!("  Input: embedded images from the raw document");
        } else {
            println!("  Queries:");
            for query in task.queries {
                println!("    - {}", query);
            }
        }
        println!();
    }
}
