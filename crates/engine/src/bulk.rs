use futures::stream::{self, StreamExt};

use nexus_models::{BulkCheckItem, BulkCheckRequest, CheckRequest, Decision};

use crate::error::Result;
use crate::evaluator::Evaluator;

/// Batches many `(permission, object)` checks for one subject. Each item
/// still goes through `Evaluator::check`'s own Tiger/Final-cache fast
/// path, so items sharing subject, permission, or object-ancestry warm
/// each other's Subproblem/Leopard/Tiger entries as the batch drains —
/// the database only pays for the first cache miss in a shared chain,
/// not once per item.
///
/// Work is parallelized with a cap proportional to CPU count rather than
/// one task per item, so a directory listing of thousands of entries
/// doesn't flood the tuple store with concurrent connections.
pub async fn bulk_check(evaluator: &Evaluator, req: BulkCheckRequest) -> Result<Vec<(BulkCheckItem, Decision)>> {
    let concurrency = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

    let results = stream::iter(req.items.into_iter().map(|item| {
        let principal = req.principal.clone();
        let query_tenant_id = req.query_tenant_id.clone();
        let consistency = req.consistency;
        let deadline = req.deadline;
        async move {
            let check = CheckRequest {
                principal,
                permission: item.permission.clone(),
                object: item.object.clone(),
                query_tenant_id,
                consistency,
                deadline,
            };
            let decision = evaluator.check(check).await;
            (item, decision)
        }
    }))
    .buffer_unordered(concurrency)
    .collect::<Vec<_>>()
    .await;

    results.into_iter().map(|(item, decision)| decision.map(|d| (item, d))).collect()
}

/// `filter(principal, permission, objects) -> objects` — membership only,
/// input order preserved. Built on the same batching as `bulk_check`;
/// denied/errored objects are silently dropped rather than surfaced,
/// matching the public contract ("returns input order preserved,
/// membership only").
///
/// Items are first grouped by their immediate `parent`; a group whose
/// directory is already known (via the Directory Visibility cache) to
/// show this subject nothing is dropped whole, without checking a single
/// leaf. Surviving groups still get checked item-by-item — a `true`
/// verdict only promises *some* descendant is visible, never which one —
/// and each group's visibility is (re-)recorded from the fresh results so
/// later listings under the same directory benefit.
pub async fn filter(
    evaluator: &Evaluator,
    req: BulkCheckRequest,
) -> Result<Vec<nexus_models::ObjectRef>> {
    let tenant_id = req.tenant().to_string();
    let subject_type = req.principal.subject_type.clone();
    let subject_id = req.principal.subject_id.clone();
    let order: Vec<_> = req.items.iter().map(|i| i.object.clone()).collect();

    let mut directory_of = Vec::with_capacity(req.items.len());
    for item in &req.items {
        directory_of.push(evaluator.parent_of(&tenant_id, &item.object).await);
    }

    let mut pruned = std::collections::HashSet::new();
    for directory in directory_of.iter().flatten() {
        let key = (directory.object_type.clone(), directory.object_id.clone());
        if pruned.contains(&key) {
            continue;
        }
        if evaluator.directory_pruned(&tenant_id, &subject_type, &subject_id, directory).await {
            pruned.insert(key);
        }
    }

    let BulkCheckRequest { principal, items, query_tenant_id, consistency, deadline } = req;

    let mut kept_items = Vec::new();
    let mut kept_directories = Vec::new();
    for (item, directory) in items.into_iter().zip(directory_of.into_iter()) {
        let is_pruned = directory.as_ref().is_some_and(|d| pruned.contains(&(d.object_type.clone(), d.object_id.clone())));
        if is_pruned {
            continue;
        }
        kept_items.push(item);
        kept_directories.push(directory);
    }

    let sub_req = BulkCheckRequest { principal, items: kept_items, query_tenant_id, consistency, deadline };
    let decided = bulk_check(evaluator, sub_req).await?;

    let mut directory_visibility: std::collections::HashMap<(String, String), (nexus_models::ObjectRef, bool)> =
        std::collections::HashMap::new();
    let mut allowed = std::collections::HashSet::new();
    for ((item, decision), directory) in decided.into_iter().zip(kept_directories.into_iter()) {
        if decision.allow {
            allowed.insert(item.object.clone());
        }
        if let Some(directory) = directory {
            let key = (directory.object_type.clone(), directory.object_id.clone());
            let entry = directory_visibility.entry(key).or_insert((directory, false));
            entry.1 |= decision.allow;
        }
    }

    for (directory, visible) in directory_visibility.into_values() {
        evaluator.record_directory_visibility(&tenant_id, &subject_type, &subject_id, &directory, visible).await;
    }

    Ok(order.into_iter().filter(|o| allowed.contains(o)).collect())
}
