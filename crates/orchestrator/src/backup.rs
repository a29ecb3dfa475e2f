//! The backup driver, per §4.B: assembles every catalog probe into the
//! global DDL emission order, writes `metadata.sql`/`toc.yaml`/
//! `config.yaml` (and `statistics.sql` under `--with-stats`), then drives
//! table data movement for the resolved table set.
//!
//! Table emission follows catalog probe order (`schema_name`,
//! `relation_name`), not a computed dependency graph: `Relation.depends_upon`
//! is never populated by the probe layer here (see DESIGN.md), so
//! `gpbackup_ddl::DependencyGraph` stays available for callers with a real
//! foreign-key/inheritance oid graph to feed it but isn't exercised in this
//! driver.
//!
//! Every probe in this file runs inside the single serializable, read-only
//! transaction `catalog_conn.open_and_export_snapshot` opens, per §4.A's
//! isolation contract. That transaction is held open for the entire
//! backup (including the data-movement phase, whose workers import its
//! exported snapshot id) and is only committed once the sidecars are
//! written.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sqlx::{Postgres, Transaction};

use gpbackup_archive::{AncestorPointer, BackupConfig, CompressionConfig, DataEntry, FilterSet, Layout, PluginConfig, Section, Toc};
use gpbackup_catalog::{self as catalog, quote_ident, AoModificationCount, CatalogConnection, Relation, RelationKind};
use gpbackup_ddl::{emit_into, DdlObject};

use crate::data;
use crate::error::Error;
use crate::filters::resolve_tables;
use crate::incremental::{self, TableSource};
use crate::ledger::CleanupLedger;

pub struct BackupOptions {
    pub layout: Layout,
    pub helper_executable: PathBuf,
    pub filters: FilterSet,
    pub metadata_only: bool,
    pub data_only: bool,
    pub with_stats: bool,
    pub leaf_partition_data: bool,
    pub single_data_file: bool,
    pub compression: CompressionConfig,
    pub jobs: usize,
    pub incremental_from: Option<String>,
    pub database_name: String,
    pub gpbackup_version: String,
    pub database_version: String,
    pub plugin: Option<PluginConfig>,
}

pub struct BackupResult {
    pub config: BackupConfig,
    pub toc: Toc,
}

pub async fn run_backup(
    catalog_conn: &CatalogConnection,
    options: &BackupOptions,
    aborting: Arc<AtomicBool>,
    ledger: Arc<CleanupLedger>,
) -> Result<BackupResult, Error> {
    let layout = &options.layout;

    let (mut txn, snapshot) = catalog_conn.open_and_export_snapshot().await?;
    tracing::info!(snapshot = %snapshot.0, "catalog snapshot exported");

    let relations = catalog::fetch_relations(&mut *txn).await?;
    let all_tables: BTreeSet<String> = relations
        .iter()
        .filter(|r| r.kind == RelationKind::Table)
        .map(|r| format!("{}.{}", r.schema_name, r.relation_name))
        .collect();
    let leaf_partition_parents: HashMap<String, String> =
        catalog::fetch_leaf_partition_parents(&mut *txn).await?.into_iter().collect();
    let included = resolve_tables(
        &options.filters,
        &all_tables,
        &leaf_partition_parents,
        options.leaf_partition_data,
    )?;
    let tables: Vec<Relation> = relations
        .iter()
        .filter(|r| r.kind == RelationKind::Table && included.contains(&format!("{}.{}", r.schema_name, r.relation_name)))
        .cloned()
        .collect();

    let mut toc = Toc::default();

    if !options.data_only {
        write_metadata(&mut txn, &relations, &tables, layout, &mut toc).await?;
        if options.with_stats {
            write_statistics(&mut txn, &tables, layout, &mut toc).await?;
        }
    }

    if !options.metadata_only {
        let content_ids = {
            let segments = catalog::fetch_segment_content_ids(&mut *txn).await?;
            if segments.is_empty() {
                vec![0]
            } else {
                segments
            }
        };

        let ao_counts: HashMap<u32, AoModificationCount> = catalog::fetch_ao_modification_counts(&mut *txn)
            .await?
            .into_iter()
            .map(|c| (c.relation_oid, c))
            .collect();

        let (rewrite_tables, pointer_entries) = resolve_incremental_sources(&options.incremental_from, layout, &tables, &ao_counts)?;

        let mut entries = data::run_backup(
            &rewrite_tables,
            layout,
            &content_ids,
            catalog_conn,
            &snapshot,
            &options.helper_executable,
            options.single_data_file,
            &options.compression,
            options.jobs,
            aborting,
            ledger,
        )
        .await?;
        entries.extend(pointer_entries);
        entries.sort_by_key(|e| e.relation_oid);
        toc.data_entries = entries;

        let config = BackupConfig {
            timestamp: layout.timestamp.to_string(),
            database_name: options.database_name.clone(),
            gpbackup_version: options.gpbackup_version.clone(),
            database_version: options.database_version.clone(),
            compression: options.compression.clone(),
            single_data_file: options.single_data_file,
            plugin: options.plugin.clone(),
            filters: options.filters.clone(),
            incremental_from: options.incremental_from.clone(),
            segment_count: content_ids.len() as u32,
            leaf_partition_parents: leaf_partition_parents.clone().into_iter().collect(),
            ao_modification_counts: ao_counts
                .into_iter()
                .filter(|(_, c)| c.is_append_optimized)
                .map(|(oid, c)| (oid, c.modcount))
                .collect(),
        };

        write_sidecars(layout, &config, &toc)?;
        txn.commit().await.map_err(gpbackup_catalog::CatalogError::from)?;
        return Ok(BackupResult { config, toc });
    }

    let config = BackupConfig {
        timestamp: layout.timestamp.to_string(),
        database_name: options.database_name.clone(),
        gpbackup_version: options.gpbackup_version.clone(),
        database_version: options.database_version.clone(),
        compression: options.compression.clone(),
        single_data_file: options.single_data_file,
        plugin: options.plugin.clone(),
        filters: options.filters.clone(),
        incremental_from: options.incremental_from.clone(),
        segment_count: 0,
        leaf_partition_parents: leaf_partition_parents.into_iter().collect(),
        ao_modification_counts: HashMap::new().into_iter().collect(),
    };
    write_sidecars(layout, &config, &toc)?;
    txn.commit().await.map_err(gpbackup_catalog::CatalogError::from)?;
    Ok(BackupResult { config, toc })
}

/// Splits `tables` into the set that must be rewritten and the set an
/// incremental backup can instead record as a pointer into an ancestor's
/// already-archived data, per §4.F. Returns every table unchanged (as
/// `Rewrite`) when `incremental_from` is `None`.
fn resolve_incremental_sources(
    incremental_from: &Option<String>,
    layout: &Layout,
    tables: &[Relation],
    ao_counts: &HashMap<u32, AoModificationCount>,
) -> Result<(Vec<Relation>, Vec<DataEntry>), Error> {
    let Some(from_timestamp) = incremental_from else {
        return Ok((tables.to_vec(), Vec::new()));
    };

    let history = incremental::load_history(&layout.root)?;
    let chain = incremental::resolve_chain(from_timestamp, &history)?;
    let modcounts_by_timestamp: HashMap<String, HashMap<u32, AoModificationCount>> =
        chain.iter().map(|c| (c.timestamp.clone(), incremental::ancestor_modcounts(c))).collect();

    let mut rewrite = Vec::new();
    let mut pointers = Vec::new();
    for table in tables {
        let current = ao_counts.get(&table.relation_oid).cloned().unwrap_or(AoModificationCount {
            relation_oid: table.relation_oid,
            modcount: 0,
            is_append_optimized: false,
        });
        match incremental::resolve_table_source(table.relation_oid, &current, &chain, &modcounts_by_timestamp) {
            TableSource::Rewrite => rewrite.push(table.clone()),
            TableSource::PointAt { ancestor_timestamp } => {
                tracing::debug!(table = %table.qualified_name(), ancestor = %ancestor_timestamp, "table unchanged since ancestor, pointing at its data");
                pointers.push(DataEntry {
                    relation_oid: table.relation_oid,
                    schema: table.schema_name.clone(),
                    name: table.relation_name.clone(),
                    single_file_range: None,
                    ancestor: Some(AncestorPointer { timestamp: ancestor_timestamp }),
                });
            }
        }
    }
    Ok((rewrite, pointers))
}

fn write_sidecars(layout: &Layout, config: &BackupConfig, toc: &Toc) -> Result<(), Error> {
    if let Some(parent) = layout.config_file().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(layout.config_file(), config.to_yaml()?)?;
    std::fs::write(layout.toc_file(), toc.to_yaml()?)?;
    Ok(())
}

/// Writes the full predata + postdata pass into one physical
/// `metadata.sql` file and splits the resulting byte-offset section at the
/// predata/postdata boundary, per §4.B: both passes share one running byte
/// counter since they land in the same file.
async fn write_metadata(
    tx: &mut Transaction<'_, Postgres>,
    relations: &[Relation],
    tables: &[Relation],
    layout: &Layout,
    toc: &mut Toc,
) -> Result<(), Error> {
    if let Some(parent) = layout.metadata_file().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(layout.metadata_file())?);
    let mut section = Section::new();

    for (name, setting) in catalog::fetch_session_gucs(&mut **tx).await? {
        write!(file, "SET {name} = {setting};\n")?;
    }

    let predata = build_predata_objects(tx, relations, tables).await?;
    for object in &predata {
        emit_into(object, &mut file, &mut section)?;
    }
    let predata_boundary = section.entry_count();

    let postdata = build_postdata_objects(tx, relations).await?;
    for object in &postdata {
        emit_into(object, &mut file, &mut section)?;
    }

    file.flush()?;

    let mut entries = section.into_entries();
    toc.postdata_entries = entries.split_off(predata_boundary);
    toc.predata_entries = entries;
    Ok(())
}

/// Builds every predata object (schemas through constraints, §4.B steps
/// 2-11) plus relation metadata (step 12), in emission order.
async fn build_predata_objects(
    tx: &mut Transaction<'_, Postgres>,
    relations: &[Relation],
    tables: &[Relation],
) -> Result<Vec<DdlObject>, Error> {
    let mut objects = Vec::new();

    for schema in catalog::fetch_schemas(&mut **tx).await? {
        objects.push(DdlObject::Schema(schema));
    }

    for language in catalog::fetch_languages(&mut **tx).await? {
        objects.push(DdlObject::Language(language));
    }

    let types = catalog::fetch_types(&mut **tx).await?;
    let base_types: Vec<_> = types.iter().filter(|t| t.kind == catalog::TypeKind::Base).collect();
    for type_def in &base_types {
        objects.push(DdlObject::ShellType { schema: type_def.schema_name.clone(), name: type_def.type_name.clone() });
    }

    let functions = catalog::fetch_functions(&mut **tx).await?;
    let function_names: HashMap<u32, String> = functions
        .iter()
        .map(|f| (f.function_oid, format!("{}.{}", quote_ident(&f.schema_name), quote_ident(&f.function_name))))
        .collect();
    for function in functions {
        objects.push(DdlObject::Function(function));
    }

    for type_def in base_types {
        objects.push(DdlObject::BaseType(type_def.clone()));
    }
    let composite_rows: Vec<_> = types.iter().filter(|t| t.kind == catalog::TypeKind::Composite).cloned().collect();
    for (schema, name, sql) in gpbackup_ddl::emit::types::render_composite_types(&composite_rows) {
        objects.push(DdlObject::CompositeType { schema, name, sql });
    }
    for type_def in types.into_iter().filter(|t| t.kind == catalog::TypeKind::Enum) {
        objects.push(DdlObject::EnumType(type_def));
    }

    for cast in catalog::fetch_casts(&mut **tx).await? {
        objects.push(DdlObject::Cast(cast));
    }
    for aggregate in catalog::fetch_aggregates(&mut **tx).await? {
        objects.push(DdlObject::Aggregate { definition: aggregate, function_names: function_names.clone() });
    }

    let sequences = catalog::fetch_sequences(&mut **tx).await?;
    for sequence in &sequences {
        objects.push(DdlObject::SequenceDefinition(sequence.clone()));
        push_relation_metadata(tx, &mut objects, &sequence.relation, "SEQUENCE").await?;
    }

    let inheritance: HashMap<u32, Vec<String>> = catalog::fetch_inheritance(&mut **tx).await?.into_iter().collect();
    for table in tables {
        let mut relation = table.clone();
        relation.inherits = inheritance.get(&relation.relation_oid).cloned().unwrap_or_default();
        let definition = build_table_definition(tx, &relation).await?;
        objects.push(DdlObject::Table { relation: relation.clone(), table: definition });
        push_relation_metadata(tx, &mut objects, &relation, "TABLE").await?;
    }

    for view in catalog::fetch_views(&mut **tx).await? {
        let relation = relations
            .iter()
            .find(|r| r.relation_oid == view.oid)
            .cloned()
            .unwrap_or_else(|| view_as_relation(&view));
        objects.push(DdlObject::View(view));
        push_relation_metadata(tx, &mut objects, &relation, "VIEW").await?;
    }

    let mut constraints = catalog::fetch_constraints(&mut **tx).await?;
    constraints.sort_by(|a, b| a.is_foreign_key.cmp(&b.is_foreign_key).then_with(|| a.constraint_name.cmp(&b.constraint_name)));
    for constraint in constraints {
        objects.push(DdlObject::Constraint(constraint));
    }

    Ok(objects)
}

/// Builds the single post-data step (§4.B step 13): `ALTER SEQUENCE ...
/// OWNED BY`, which must follow the owning table's creation.
async fn build_postdata_objects(tx: &mut Transaction<'_, Postgres>, _relations: &[Relation]) -> Result<Vec<DdlObject>, Error> {
    let sequences = catalog::fetch_sequences(&mut **tx).await?;
    Ok(sequences.into_iter().map(DdlObject::SequenceOwnedBy).collect())
}

async fn push_relation_metadata(
    tx: &mut Transaction<'_, Postgres>,
    objects: &mut Vec<DdlObject>,
    relation: &Relation,
    object_kind: &str,
) -> Result<(), Error> {
    let metadata = catalog::fetch_relation_metadata(&mut **tx, relation.relation_oid).await?;
    if metadata.owner.is_none() && metadata.comment.is_none() && metadata.acl.is_empty() && metadata.security_label.is_none() {
        return Ok(());
    }
    objects.push(DdlObject::Metadata {
        object_clause: format!("{object_kind} {}", relation.qualified_name()),
        schema: relation.schema_name.clone(),
        name: relation.relation_name.clone(),
        metadata,
    });
    Ok(())
}

fn view_as_relation(view: &catalog::View) -> Relation {
    Relation {
        schema_oid: 0,
        relation_oid: view.oid,
        schema_name: view.schema_name.clone(),
        relation_name: view.view_name.clone(),
        kind: RelationKind::View,
        depends_upon: Vec::new(),
        inherits: Vec::new(),
    }
}

async fn build_table_definition(
    tx: &mut Transaction<'_, Postgres>,
    relation: &Relation,
) -> Result<catalog::TableDefinition, Error> {
    let columns = catalog::fetch_columns(&mut **tx, relation.relation_oid).await?;
    Ok(catalog::TableDefinition {
        columns,
        distribution_policy: String::new(),
        partition_def: String::new(),
        partition_template_def: String::new(),
        storage_options: String::new(),
        tablespace: String::new(),
        is_external: false,
        external: None,
    })
}

async fn write_statistics(
    tx: &mut Transaction<'_, Postgres>,
    tables: &[Relation],
    layout: &Layout,
    toc: &mut Toc,
) -> Result<(), Error> {
    if let Some(parent) = layout.statistics_file().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(layout.statistics_file())?);
    let mut section = Section::new();

    for table in tables {
        let stats = catalog::fetch_table_statistics(&mut **tx, table).await?;
        let object = DdlObject::Statistics { relation: table.clone(), stats };
        emit_into(&object, &mut file, &mut section)?;
    }

    file.flush()?;
    toc.statistics_entries = section.into_entries();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_view_as_relation_carries_oid_and_names() {
        let view = catalog::View {
            schema_name: "public".to_string(),
            view_name: "active_customers".to_string(),
            oid: 16501,
            definition: "select 1".to_string(),
        };
        let relation = view_as_relation(&view);
        assert_eq!(relation.relation_oid, 16501);
        assert_eq!(relation.qualified_name(), "public.active_customers");
    }

    #[test]
    fn test_resolve_incremental_sources_passthrough_without_incremental_from() {
        let layout = Layout::new("/tmp/gpbackup-test-unused", gpbackup_archive::Timestamp::parse("20260727000000").unwrap());
        let table = Relation {
            schema_oid: 0,
            relation_oid: 100,
            schema_name: "public".to_string(),
            relation_name: "orders".to_string(),
            kind: RelationKind::Table,
            depends_upon: Vec::new(),
            inherits: Vec::new(),
        };
        let (rewrite, pointers) = resolve_incremental_sources(&None, &layout, &[table], &HashMap::new()).unwrap();
        assert_eq!(rewrite.len(), 1);
        assert!(pointers.is_empty());
    }
}
