use crate::error::PipelineError;
use crate::mapping::{
    MappingTable, SupplierContext, normalize, request_suggestions,
    unknown_direct_references,
};
use crate::oracle::{CompletionOptions, Oracle};
use crate::prompt::build_request;
use crate::schema::{TargetField, load_supplier_fields};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Everything a supplier run needs besides the field lists.
#[derive(Debug, Clone)]
pub struct MappingSettings {
    pub options: CompletionOptions,
    pub timeout: Duration,
    pub hints: Vec<String>,
    pub delimiter: u8,
}

/// Final result for one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierReport {
    #[serde(flatten)]
    pub context: SupplierContext,
    pub discarded: usize,
    pub ambiguous: usize,
    pub unknown_direct: Vec<String>,
    pub mappings: MappingTable,
}

#[derive(Debug)]
pub struct SupplierOutcome {
    pub path: PathBuf,
    pub result: Result<SupplierReport, PipelineError>,
}

/// Request, normalize and audit the mapping for a single supplier.
pub async fn process_supplier(
    oracle: &dyn Oracle,
    target_fields: &[TargetField],
    context: SupplierContext,
    settings: &MappingSettings,
) -> Result<SupplierReport, PipelineError> {
    let payload =
        build_request(target_fields, &context.supplier_fields, &settings.hints)?;

    let suggestions = request_suggestions(
        oracle,
        &payload,
        &settings.options,
        settings.timeout,
    )
    .await?;

    let outcome = normalize(target_fields, &suggestions)?;

    let unknown_direct =
        unknown_direct_references(&outcome.table, &context.supplier_fields);
    if !unknown_direct.is_empty() {
        warn!(
            supplier = %context.label,
            fields = ?unknown_direct,
            "direct mappings name fields the supplier does not have"
        );
    }

    info!(
        supplier = %context.label,
        mapped = outcome.table.mapped_count(),
        total = target_fields.len(),
        discarded = outcome.discarded,
        "mapping table ready"
    );

    Ok(SupplierReport {
        context,
        discarded: outcome.discarded,
        ambiguous: outcome.ambiguous,
        unknown_direct,
        mappings: outcome.table,
    })
}

async fn process_supplier_file(
    oracle: &dyn Oracle,
    target_fields: &[TargetField],
    path: &Path,
    settings: &MappingSettings,
) -> Result<SupplierReport, PipelineError> {
    let supplier_fields = load_supplier_fields(path, settings.delimiter)?;
    let context = SupplierContext::from_path(path, supplier_fields);
    info!(
        supplier = %context.label,
        fields = context.supplier_fields.len(),
        "processing supplier"
    );
    process_supplier(oracle, target_fields, context, settings).await
}

/// Maps every supplier file, at most `concurrency` at a time.
///
/// Each supplier runs in its own task. A failure is logged and returned in
/// its outcome; the other suppliers are unaffected. Outcomes come back in
/// the order of `supplier_paths`.
pub async fn process_all(
    oracle: Arc<dyn Oracle>,
    target_fields: Arc<Vec<TargetField>>,
    supplier_paths: Vec<PathBuf>,
    settings: Arc<MappingSettings>,
    concurrency: usize,
) -> Vec<SupplierOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, path) in supplier_paths.iter().cloned().enumerate() {
        let oracle = Arc::clone(&oracle);
        let target_fields = Arc::clone(&target_fields);
        let settings = Arc::clone(&settings);
        let semaphore = Arc::clone(&semaphore);

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                let failure =
                    PipelineError::Task("concurrency limiter closed".to_owned());
                return (index, Err(failure));
            };
            let result = process_supplier_file(
                oracle.as_ref(),
                &target_fields,
                &path,
                &settings,
            )
            .await;
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<SupplierReport, PipelineError>>> =
        supplier_paths.iter().map(|_| None).collect();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Some(slot) = results.get_mut(index) {
                    *slot = Some(result);
                }
            }
            Err(e) => error!("supplier task panicked: {e}"),
        }
    }

    supplier_paths
        .into_iter()
        .zip(results)
        .map(|(path, result)| {
            let result = result.unwrap_or_else(|| {
                Err(PipelineError::Task("task did not complete".to_owned()))
            });
            if let Err(e) = &result {
                error!(supplier = %path.display(), "mapping failed: {e}");
            }
            SupplierOutcome { path, result }
        })
        .collect()
}
