//! Typed catalog probe operations, one function per object kind, per §4.A.
//!
//! The catalog query SQL itself is an external contract: callers only rely
//! on "the probe returns records of kind K," not on exact query text. The
//! queries below are representative shapes against
//! `pg_catalog`/`information_schema`-style views, following the convention
//! of one typed row struct and one `sqlx::query_as` function per module --
//! using runtime-checked `query_as` rather than the compile-time-checked
//! `query_as!` macro, since this workspace has no live database to check
//! against at build time.

use crate::model::*;
use crate::Result;
use itertools::Itertools;
use sqlx::{Executor, Postgres};

/// Returns every included relation, ordered by `(schema_name,
/// relation_name)` per §4.A's determinism contract. The ordering is also
/// asserted in Rust rather than trusted to the database alone.
pub async fn fetch_relations<'e, E>(executor: E) -> Result<Vec<Relation>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        schema_oid: i32,
        relation_oid: i32,
        schema_name: String,
        relation_name: String,
        relkind: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select n.oid as schema_oid, c.oid as relation_oid, n.nspname as schema_name, c.relname as relation_name,
               c.relkind::text as relkind
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        where c.relkind in ('r', 'v', 'S', 'f')
        order by n.nspname, c.relname
        "#,
    )
    .fetch_all(executor)
    .await?;

    let relations = rows
        .into_iter()
        .filter_map(|r| {
            let kind = RelationKind::from_relkind(r.relkind.chars().next()?)?;
            Some(Relation {
                schema_oid: r.schema_oid as u32,
                relation_oid: r.relation_oid as u32,
                schema_name: r.schema_name,
                relation_name: r.relation_name,
                kind,
                depends_upon: Vec::new(),
                inherits: Vec::new(),
            })
        })
        .collect::<Vec<_>>();

    debug_assert!(is_sorted_by_schema_then_name(&relations));
    Ok(relations)
}

fn is_sorted_by_schema_then_name(relations: &[Relation]) -> bool {
    relations
        .iter()
        .tuple_windows()
        .all(|(a, b)| (&a.schema_name, &a.relation_name) <= (&b.schema_name, &b.relation_name))
}

/// Fetches `INHERITS` parents for every relation, schema-qualified and
/// quoted, ready to splice into a `CREATE TABLE ... INHERITS (...)` clause.
pub async fn fetch_inheritance<'e, E>(executor: E) -> Result<Vec<(u32, Vec<String>)>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        child_oid: i32,
        parent_schema: String,
        parent_name: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select i.inhrelid as child_oid, pn.nspname as parent_schema, pc.relname as parent_name
        from pg_inherits i
        join pg_class pc on pc.oid = i.inhparent
        join pg_namespace pn on pn.oid = pc.relnamespace
        order by i.inhrelid, i.inhseqno
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| (r.child_oid as u32, quote_ident(&r.parent_schema) + "." + &quote_ident(&r.parent_name)))
        .into_group_map()
        .into_iter()
        .collect())
}

/// Fetches column definitions for every relation oid, ordered by
/// `attnum`, including dropped columns (the emitter skips them but the
/// TableDefinition invariant needs to see them to preserve column numbering
/// downstream).
pub async fn fetch_columns<'e, E>(executor: E, relation_oid: u32) -> Result<Vec<ColumnDefinition>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        name: String,
        type_name: String,
        has_default: bool,
        default_value: Option<String>,
        not_null: bool,
        stat_target: i32,
        storage_type: String,
        encoding: Option<String>,
        is_dropped: bool,
        comment: Option<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select a.attname as name,
               format_type(a.atttypid, a.atttypmod) as type_name,
               a.atthasdef as has_default,
               pg_get_expr(d.adbin, d.adrelid) as default_value,
               a.attnotnull as not_null,
               a.attstattarget as stat_target,
               case a.attstorage when 'p' then 'PLAIN' when 'e' then 'EXTERNAL'
                    when 'm' then 'MAIN' when 'x' then 'EXTENDED' else '' end as storage_type,
               null as encoding,
               a.attisdropped as is_dropped,
               col_description(a.attrelid, a.attnum) as comment
        from pg_attribute a
        left join pg_attrdef d on d.adrelid = a.attrelid and d.adnum = a.attnum
        where a.attrelid = $1 and a.attnum > 0
        order by a.attnum
        "#,
    )
    .bind(relation_oid as i32)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ColumnDefinition {
            name: r.name,
            type_name: r.type_name,
            has_default: r.has_default,
            default_value: r.default_value.unwrap_or_default(),
            not_null: r.not_null,
            stat_target: r.stat_target,
            storage_type: r.storage_type,
            encoding: r.encoding.unwrap_or_default(),
            is_dropped: r.is_dropped,
            comment: r.comment.unwrap_or_default(),
        })
        .collect())
}

/// Fetches the modification counter of every append-optimized table, used
/// by the orchestrator's incremental resolution (§4.F). Heap tables are
/// reported with `is_append_optimized = false` and are always rewritten.
pub async fn fetch_ao_modification_counts<'e, E>(executor: E) -> Result<Vec<AoModificationCount>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        relation_oid: i32,
        modcount: i64,
        is_append_optimized: bool,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select c.oid as relation_oid,
               coalesce(s.modcount, 0) as modcount,
               (a.relid is not null) as is_append_optimized
        from pg_class c
        left join pg_appendonly a on a.relid = c.oid
        left join gp_toolkit.__gp_aoseg_modcount s on s.oid = c.oid
        where c.relkind = 'r'
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| AoModificationCount {
            relation_oid: r.relation_oid as u32,
            modcount: r.modcount,
            is_append_optimized: r.is_append_optimized,
        })
        .collect())
}

/// Fetches session-level GUCs that must be set in the metadata file
/// preamble before any DDL, per §4.B step 1.
pub async fn fetch_session_gucs<'e, E>(executor: E) -> Result<Vec<(String, String)>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        name: String,
        setting: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select name, setting from pg_settings
        where name in ('search_path', 'default_with_oids', 'gp_default_storage_options')
        order by name
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| (r.name, r.setting)).collect())
}

/// Fetches every view's definition, per §4.B step 10. `pg_get_viewdef`
/// already returns a trailing-semicolon-free `SELECT ...` body, ready to
/// splice into `CREATE VIEW ... AS`.
pub async fn fetch_views<'e, E>(executor: E) -> Result<Vec<View>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        schema_name: String,
        view_name: String,
        oid: i32,
        definition: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select n.nspname as schema_name, c.relname as view_name, c.oid as oid,
               pg_get_viewdef(c.oid, true) as definition
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        where c.relkind = 'v'
        order by n.nspname, c.relname
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| View {
            schema_name: r.schema_name,
            view_name: r.view_name,
            oid: r.oid as u32,
            definition: r.definition,
        })
        .collect())
}

/// Fetches every sequence's current definition, per §4.B step 8, plus the
/// column it is `OWNED BY` (if any) for the post-data `ALTER SEQUENCE ...
/// OWNED BY` emitted in step 13.
pub async fn fetch_sequences<'e, E>(executor: E) -> Result<Vec<Sequence>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        schema_oid: i32,
        relation_oid: i32,
        schema_name: String,
        relation_name: String,
        last_value: i64,
        increment_by: i64,
        max_value: i64,
        min_value: i64,
        cache_size: i64,
        cycle: bool,
        is_called: bool,
        owning_column: Option<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select n.oid as schema_oid, c.oid as relation_oid, n.nspname as schema_name, c.relname as relation_name,
               s.last_value, s.increment_by, s.max_value, s.min_value, s.cache_size, s.cycle, s.is_called,
               quote_ident(own.nspname) || '.' || quote_ident(owc.relname) || '.' || quote_ident(a.attname)
                   as owning_column
        from pg_sequence s
        join pg_class c on c.oid = s.seqrelid
        join pg_namespace n on n.oid = c.relnamespace
        left join pg_depend d on d.objid = c.oid and d.deptype = 'a'
        left join pg_class owc on owc.oid = d.refobjid
        left join pg_namespace own on own.oid = owc.relnamespace
        left join pg_attribute a on a.attrelid = d.refobjid and a.attnum = d.refobjsubid
        order by n.nspname, c.relname
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Sequence {
            relation: Relation {
                schema_oid: r.schema_oid as u32,
                relation_oid: r.relation_oid as u32,
                schema_name: r.schema_name,
                relation_name: r.relation_name,
                kind: RelationKind::Sequence,
                depends_upon: Vec::new(),
                inherits: Vec::new(),
            },
            definition: SequenceDefinition {
                last_val: r.last_value,
                increment: r.increment_by,
                max_val: r.max_value,
                min_val: r.min_value,
                cache_val: r.cache_size,
                is_cycled: r.cycle,
                is_called: r.is_called,
            },
            owning_column: r.owning_column,
        })
        .collect())
}

/// Fetches every non-system schema (everything but `pg_catalog`,
/// `information_schema`, and the `pg_toast` family), excluding `public`
/// which the restore target is assumed to already provide, per §4.B
/// step 2.
pub async fn fetch_schemas<'e, E>(executor: E) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        nspname: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select nspname from pg_namespace
        where nspname not in ('pg_catalog', 'information_schema', 'public')
          and nspname not like 'pg_temp%' and nspname not like 'pg_toast%'
        order by nspname
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.nspname).collect())
}

/// Fetches every non-builtin procedural language, per §4.B step 3.
pub async fn fetch_languages<'e, E>(executor: E) -> Result<Vec<ProceduralLanguage>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        lanname: String,
        owner: Option<String>,
        lanplcallfoid: i32,
        lanpltrusted: bool,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select l.lanname, pg_get_userbyid(l.lanowner) as owner,
               l.lanplcallfoid as lanplcallfoid, l.lanpltrusted as lanpltrusted
        from pg_language l
        where l.lanispl
        order by l.lanname
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ProceduralLanguage {
            name: r.lanname,
            owner: r.owner,
            handler_function: if r.lanplcallfoid == 0 { None } else { Some(r.lanplcallfoid as u32) },
            is_trusted: r.lanpltrusted,
        })
        .collect())
}

/// Fetches every user-defined function, per §4.B step 5. Built-in
/// functions (`pg_proc.proisagg = false` already filters out aggregates,
/// which are fetched separately by `fetch_aggregates`) are excluded by
/// restricting to non-system namespaces.
pub async fn fetch_functions<'e, E>(executor: E) -> Result<Vec<FunctionDefinition>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        schema_name: String,
        function_name: String,
        function_oid: i32,
        arguments: String,
        ident_args: String,
        result_type: String,
        returns_set: bool,
        language: String,
        function_body: String,
        binary_path: Option<String>,
        volatility: String,
        is_strict: bool,
        is_security_definer: bool,
        cost: f64,
        num_rows: f64,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select n.nspname as schema_name, p.proname as function_name, p.oid as function_oid,
               pg_get_function_arguments(p.oid) as arguments,
               pg_get_function_identity_arguments(p.oid) as ident_args,
               pg_get_function_result(p.oid) as result_type,
               p.proretset as returns_set,
               l.lanname as language,
               case when l.lanname in ('c', 'internal') then p.prosrc else coalesce(p.prosrc, '') end as function_body,
               p.probin::text as binary_path,
               case p.provolatile when 'i' then 'IMMUTABLE' when 's' then 'STABLE' else 'VOLATILE' end as volatility,
               p.proisstrict as is_strict,
               p.prosecdef as is_security_definer,
               p.procost as cost,
               p.prorows as num_rows
        from pg_proc p
        join pg_namespace n on n.oid = p.pronamespace
        join pg_language l on l.oid = p.prolang
        where not p.proisagg and n.nspname not in ('pg_catalog', 'information_schema')
        order by n.nspname, p.proname, p.oid
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| FunctionDefinition {
            schema_name: r.schema_name,
            function_name: r.function_name,
            function_oid: r.function_oid as u32,
            arguments: r.arguments,
            ident_args: r.ident_args,
            result_type: r.result_type,
            returns_set: r.returns_set,
            language: r.language,
            function_body: r.function_body,
            binary_path: r.binary_path.unwrap_or_default(),
            sql_usage: String::new(),
            volatility: r.volatility,
            is_strict: r.is_strict,
            is_security_definer: r.is_security_definer,
            cost: r.cost,
            num_rows: r.num_rows,
            config_clauses: Vec::new(),
        })
        .collect())
}

/// Fetches every user-defined aggregate, per §4.B step 7.
pub async fn fetch_aggregates<'e, E>(executor: E) -> Result<Vec<AggregateDefinition>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        schema_name: String,
        aggregate_name: String,
        arguments: String,
        ident_args: String,
        is_ordered: bool,
        transition_function: i32,
        transition_data_type: String,
        preliminary_function: Option<i32>,
        final_function: Option<i32>,
        initial_value: Option<String>,
        sort_operator: Option<i32>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select n.nspname as schema_name, p.proname as aggregate_name,
               pg_get_function_arguments(p.oid) as arguments,
               pg_get_function_identity_arguments(p.oid) as ident_args,
               a.aggkind = 'o' as is_ordered,
               a.aggtransfn as transition_function,
               format_type(a.aggtranstype, null) as transition_data_type,
               nullif(a.aggcombinefn, 0) as preliminary_function,
               nullif(a.aggfinalfn, 0) as final_function,
               a.agginitval as initial_value,
               nullif(a.aggsortop, 0) as sort_operator
        from pg_aggregate a
        join pg_proc p on p.oid = a.aggfnoid
        join pg_namespace n on n.oid = p.pronamespace
        order by n.nspname, p.proname, p.oid
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| AggregateDefinition {
            schema_name: r.schema_name,
            aggregate_name: r.aggregate_name,
            arguments: r.arguments,
            ident_args: r.ident_args,
            is_ordered: r.is_ordered,
            transition_function: r.transition_function as u32,
            transition_data_type: r.transition_data_type,
            preliminary_function: r.preliminary_function.map(|v| v as u32),
            final_function: r.final_function.map(|v| v as u32),
            initial_value: r.initial_value,
            sort_operator: r.sort_operator.map(|v| v as u32),
        })
        .collect())
}

/// Fetches every user-defined cast, per §4.B step 7.
pub async fn fetch_casts<'e, E>(executor: E) -> Result<Vec<CastDefinition>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        source_type: String,
        target_type: String,
        function_schema: Option<String>,
        function_name: Option<String>,
        function_args: Option<String>,
        cast_context: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select format_type(c.castsource, null) as source_type,
               format_type(c.casttarget, null) as target_type,
               fn.nspname as function_schema,
               p.proname as function_name,
               pg_get_function_identity_arguments(p.oid) as function_args,
               c.castcontext::text as cast_context
        from pg_cast c
        left join pg_proc p on p.oid = c.castfunc
        left join pg_namespace fn on fn.oid = p.pronamespace
        where c.castfunc = 0 or p.oid is not null
        order by source_type, target_type
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| CastDefinition {
            source_type: r.source_type,
            target_type: r.target_type,
            function_schema: r.function_schema,
            function_name: r.function_name,
            function_args: r.function_args.unwrap_or_default(),
            cast_context: r.cast_context,
        })
        .collect())
}

/// Fetches every user-defined base, composite, and enum type, per §4.B
/// step 6. Composite types yield one row per attribute, already ordered so
/// that a type's rows are contiguous; `emit::types::render_composite_types`
/// groups them.
pub async fn fetch_types<'e, E>(executor: E) -> Result<Vec<TypeDefinition>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        schema_name: String,
        type_name: String,
        typtype: String,
        attribute_name: Option<String>,
        attribute_type: Option<String>,
        enum_labels: Option<Vec<String>>,
        owner: Option<String>,
        comment: Option<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select n.nspname as schema_name, t.typname as type_name, t.typtype::text as typtype,
               a.attname as attribute_name,
               case when a.attname is not null then format_type(a.atttypid, a.atttypmod) end as attribute_type,
               case when t.typtype = 'e' then
                 array(select enumlabel from pg_enum e where e.enumtypid = t.oid order by e.enumsortorder)
               end as enum_labels,
               pg_get_userbyid(t.typowner) as owner,
               obj_description(t.oid, 'pg_type') as comment
        from pg_type t
        join pg_namespace n on n.oid = t.typnamespace
        left join pg_class c on c.oid = t.typrelid and t.typtype = 'c'
        left join pg_attribute a on a.attrelid = c.oid and a.attnum > 0 and not a.attisdropped
        where t.typtype in ('b', 'c', 'e')
          and n.nspname not in ('pg_catalog', 'information_schema')
          and (t.typtype != 'c' or c.relkind = 'c')
        order by n.nspname, t.typname, a.attnum
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| TypeDefinition {
            schema_name: r.schema_name,
            type_name: r.type_name,
            kind: match r.typtype.as_str() {
                "c" => TypeKind::Composite,
                "e" => TypeKind::Enum,
                _ => TypeKind::Base,
            },
            attribute_name: r.attribute_name,
            attribute_type: r.attribute_type,
            enum_labels: r.enum_labels.unwrap_or_default(),
            owner: r.owner,
            comment: r.comment,
        })
        .collect())
}

/// Fetches every table constraint (check, primary key, unique, foreign
/// key), per §4.B step 11.
pub async fn fetch_constraints<'e, E>(executor: E) -> Result<Vec<ConstraintDefinition>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        schema_name: String,
        relation_name: String,
        constraint_name: String,
        contype: String,
        definition: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select n.nspname as schema_name, cl.relname as relation_name, co.conname as constraint_name,
               co.contype::text as contype, pg_get_constraintdef(co.oid, true) as definition
        from pg_constraint co
        join pg_class cl on cl.oid = co.conrelid
        join pg_namespace n on n.oid = cl.relnamespace
        where co.contype in ('c', 'p', 'u', 'f')
        order by n.nspname, cl.relname, co.conname
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ConstraintDefinition {
            schema_name: r.schema_name,
            relation_name: r.relation_name,
            constraint_name: r.constraint_name,
            is_foreign_key: r.contype == "f",
            definition: r.definition,
        })
        .collect())
}

/// Fetches the owner, comment, and ACL of a single relation (table, view,
/// or sequence -- anything with a `pg_class` entry), per §4.B step 12.
pub async fn fetch_relation_metadata<'e, E>(executor: E, relation_oid: u32) -> Result<Metadata>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        owner: Option<String>,
        comment: Option<String>,
        acl: Option<Vec<String>>,
    }

    let row: Row = sqlx::query_as(
        r#"
        select pg_get_userbyid(c.relowner) as owner,
               obj_description(c.oid, 'pg_class') as comment,
               c.relacl::text[] as acl
        from pg_class c
        where c.oid = $1
        "#,
    )
    .bind(relation_oid as i32)
    .fetch_one(executor)
    .await?;

    Ok(Metadata {
        owner: row.owner,
        comment: row.comment,
        acl: row.acl.unwrap_or_default(),
        security_label: None,
    })
}

/// Fetches a relation's planner statistics, per spec's `--with-stats`
/// support: `pg_class`'s own row/page estimates plus `pg_stats`'
/// per-column `null_frac`/`n_distinct`.
pub async fn fetch_table_statistics<'e, E>(executor: E, relation: &Relation) -> Result<TableStatistics>
where
    E: Executor<'e, Database = Postgres> + Copy,
{
    #[derive(sqlx::FromRow)]
    struct ClassRow {
        reltuples: f32,
        relpages: i32,
    }
    #[derive(sqlx::FromRow)]
    struct ColumnRow {
        attname: String,
        null_frac: f32,
        n_distinct: f32,
    }

    let class_row: ClassRow = sqlx::query_as("select reltuples, relpages from pg_class where oid = $1")
        .bind(relation.relation_oid as i32)
        .fetch_one(executor)
        .await
        .unwrap_or(ClassRow { reltuples: 0.0, relpages: 0 });

    let column_rows: Vec<ColumnRow> = sqlx::query_as(
        "select attname, null_frac, n_distinct from pg_stats where schemaname = $1 and tablename = $2",
    )
    .bind(&relation.schema_name)
    .bind(&relation.relation_name)
    .fetch_all(executor)
    .await?;

    Ok(TableStatistics {
        relation_oid: relation.relation_oid,
        row_count: class_row.reltuples as i64,
        page_count: class_row.relpages as i64,
        columns: column_rows
            .into_iter()
            .map(|r| ColumnStatistics {
                column_name: r.attname,
                null_frac: r.null_frac as f64,
                n_distinct: r.n_distinct as f64,
            })
            .collect(),
    })
}

/// Fetches the primary content ids of every segment in the cluster, per
/// §4.C's per-segment archive layout. The coordinator (`content = -1`) is
/// excluded; callers that need it add it explicitly.
pub async fn fetch_segment_content_ids<'e, E>(executor: E) -> Result<Vec<i32>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        content: i32,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select content from gp_segment_configuration
        where role = 'p' and content >= 0
        order by content
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.content).collect())
}

/// Fetches every leaf partition's qualified name mapped to its top-level
/// parent's, per the orchestrator's `--leaf-partition-data` resolution
/// (§4.F, §6). Walks the legacy `pg_partition`/`pg_partition_rule` catalog
/// GPDB exposes for declarative partitioning: `pg_partition` identifies the
/// partitioned parent relation, `pg_partition_rule` enumerates its leaf
/// child relations (`parisdefault` excluded only when a value rule also
/// matches; the default partition itself is a valid leaf).
pub async fn fetch_leaf_partition_parents<'e, E>(executor: E) -> Result<Vec<(String, String)>>
where
    E: Executor<'e, Database = Postgres>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        leaf_schema: String,
        leaf_name: String,
        parent_schema: String,
        parent_name: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        select ln.nspname as leaf_schema, lc.relname as leaf_name,
               pn.nspname as parent_schema, pc.relname as parent_name
        from pg_partition_rule pr
        join pg_partition p on p.oid = pr.paroid
        join pg_class pc on pc.oid = p.parrelid
        join pg_namespace pn on pn.oid = pc.relnamespace
        join pg_class lc on lc.oid = pr.parchildrelid
        join pg_namespace ln on ln.oid = lc.relnamespace
        where p.parlevel = (select max(p2.parlevel) from pg_partition p2 where p2.parrelid = p.parrelid)
        order by pn.nspname, pc.relname, ln.nspname, lc.relname
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            (
                format!("{}.{}", r.leaf_schema, r.leaf_name),
                format!("{}.{}", r.parent_schema, r.parent_name),
            )
        })
        .collect())
}
