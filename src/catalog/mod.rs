use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::buffer_pool::{ArcBufferPool, CATALOG_PAGE_ID};
use crate::errors::Error;
use crate::index::extendible_hash::DiskExtendibleHashTable;
use crate::index::{GenericKey, HashFunction};
use crate::pages::hash_bucket_page::HASH_BUCKET_SLOTS;
use crate::pages::hash_directory_page::HASH_DIRECTORY_MAX_DEPTH;
use crate::pages::{PageId, PAGE_SIZE};
use crate::printdbg;
use crate::table::TableHeap;
use crate::tuple::schema::Schema;

pub type TableOid = u32;
pub type IndexOid = u32;
pub type ArcCatalog = Arc<RwLock<Catalog>>;

/// Index keys are the key column's value serialized into 8 bytes.
pub type IndexKey = GenericKey<8>;
pub type TableIndex = DiskExtendibleHashTable<IndexKey>;

const INDEX_HEADER_MAX_DEPTH: u32 = 2;

pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Schema,
    pub heap: TableHeap,
}

pub struct IndexInfo {
    pub oid: IndexOid,
    pub name: String,
    pub table_name: String,
    pub key_schema: Schema,
    pub key_attrs: Vec<usize>,
    pub is_primary_key: bool,
    pub index: TableIndex,
}

/// Maps table and index names/oids to their runtime state. The metadata
/// (not the data) can be snapshotted into the reserved catalog page and
/// rebuilt on reopen.
pub struct Catalog {
    bpm: ArcBufferPool,
    tables: HashMap<TableOid, Arc<TableInfo>>,
    table_names: HashMap<String, TableOid>,
    indexes: HashMap<IndexOid, Arc<IndexInfo>>,
    index_names: HashMap<String, IndexOid>,
    table_indexes: HashMap<String, Vec<IndexOid>>,
    next_table_oid: TableOid,
    next_index_oid: IndexOid,
}

#[derive(Serialize, Deserialize)]
struct TableRecord {
    oid: TableOid,
    name: String,
    schema: Schema,
    first_page: PageId,
    last_page: PageId,
}

#[derive(Serialize, Deserialize)]
struct IndexRecord {
    oid: IndexOid,
    name: String,
    table_name: String,
    key_attrs: Vec<usize>,
    is_primary_key: bool,
    header_page_id: PageId,
}

#[derive(Serialize, Deserialize)]
struct CatalogSnapshot {
    next_table_oid: TableOid,
    next_index_oid: IndexOid,
    tables: Vec<TableRecord>,
    indexes: Vec<IndexRecord>,
}

impl Catalog {
    pub fn new(bpm: ArcBufferPool) -> Self {
        Self {
            bpm,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            table_indexes: HashMap::new(),
            next_table_oid: 0,
            next_index_oid: 0,
        }
    }

    pub fn new_arc(bpm: ArcBufferPool) -> ArcCatalog {
        Arc::new(RwLock::new(Self::new(bpm)))
    }

    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<Arc<TableInfo>> {
        if self.table_names.contains_key(name) {
            bail!(Error::TableExists(name.to_string()));
        }

        let heap = TableHeap::new(self.bpm.clone())?;
        let oid = self.next_table_oid;
        self.next_table_oid += 1;

        let info = Arc::new(TableInfo {
            oid,
            name: name.to_string(),
            schema,
            heap,
        });
        self.tables.insert(oid, info.clone());
        self.table_names.insert(name.to_string(), oid);
        self.table_indexes.entry(name.to_string()).or_default();

        printdbg!("catalog: created table {name} (oid {oid})");
        Ok(info)
    }

    pub fn get_table(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = self.table_names.get(name)?;
        self.tables.get(oid).cloned()
    }

    pub fn get_table_by_oid(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.get(&oid).cloned()
    }

    pub fn tables(&self) -> Vec<Arc<TableInfo>> {
        self.tables.values().cloned().collect()
    }

    pub fn create_index(
        &mut self,
        index_name: &str,
        table_name: &str,
        key_attrs: Vec<usize>,
        is_primary_key: bool,
    ) -> Result<Arc<IndexInfo>> {
        if self.index_names.contains_key(index_name) {
            bail!(Error::Internal(format!("index {index_name} already exists")));
        }
        let table = self
            .get_table(table_name)
            .ok_or(anyhow!(Error::TableNotFound(table_name.to_string())))?;

        let index = TableIndex::new(
            index_name.to_string(),
            self.bpm.clone(),
            INDEX_HEADER_MAX_DEPTH,
            HASH_DIRECTORY_MAX_DEPTH,
            HASH_BUCKET_SLOTS,
            HashFunction::default(),
        )?;

        let oid = self.next_index_oid;
        self.next_index_oid += 1;

        let info = Arc::new(IndexInfo {
            oid,
            name: index_name.to_string(),
            table_name: table_name.to_string(),
            key_schema: table.schema.copy_schema(&key_attrs),
            key_attrs,
            is_primary_key,
            index,
        });
        self.indexes.insert(oid, info.clone());
        self.index_names.insert(index_name.to_string(), oid);
        self.table_indexes
            .entry(table_name.to_string())
            .or_default()
            .push(oid);

        printdbg!("catalog: created index {index_name} on {table_name}");
        Ok(info)
    }

    pub fn get_index(&self, index_name: &str) -> Option<Arc<IndexInfo>> {
        let oid = self.index_names.get(index_name)?;
        self.indexes.get(oid).cloned()
    }

    pub fn get_index_by_oid(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.indexes.get(&oid).cloned()
    }

    pub fn table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        self.table_indexes
            .get(table_name)
            .map(|oids| oids.iter().filter_map(|o| self.indexes.get(o).cloned()).collect())
            .unwrap_or_default()
    }

    /// Snapshots the catalog metadata into the reserved page. Heaps and
    /// indexes persist through their own pages; only the id plumbing
    /// needed to reopen them goes here.
    pub fn save(&self) -> Result<()> {
        let snapshot = CatalogSnapshot {
            next_table_oid: self.next_table_oid,
            next_index_oid: self.next_index_oid,
            tables: self
                .tables
                .values()
                .map(|t| TableRecord {
                    oid: t.oid,
                    name: t.name.clone(),
                    schema: t.schema.clone(),
                    first_page: t.heap.first_page_id(),
                    last_page: t.heap.last_page_id(),
                })
                .collect(),
            indexes: self
                .indexes
                .values()
                .map(|i| IndexRecord {
                    oid: i.oid,
                    name: i.name.clone(),
                    table_name: i.table_name.clone(),
                    key_attrs: i.key_attrs.clone(),
                    is_primary_key: i.is_primary_key,
                    header_page_id: i.index.header_page_id(),
                })
                .collect(),
        };

        let encoded = bincode::serialize(&snapshot)?;
        if encoded.len() + 8 > PAGE_SIZE {
            bail!(Error::Internal("catalog snapshot outgrew its page".into()));
        }

        // the snapshot is raw length-prefixed bytes, not a typed payload
        let page = self.bpm.lock().fetch_page(CATALOG_PAGE_ID)?;
        page.latch().wlock();
        {
            let data = unsafe { page.data_mut() };
            data[..8].copy_from_slice(&(encoded.len() as u64).to_le_bytes());
            data[8..8 + encoded.len()].copy_from_slice(&encoded);
        }
        page.set_dirty(true);
        page.latch().wunlock();
        self.bpm.lock().unpin_page(&CATALOG_PAGE_ID, true)?;
        self.bpm.lock().flush_page(&CATALOG_PAGE_ID)?;
        Ok(())
    }

    /// Rebuilds a catalog from the reserved page's snapshot. Tables and
    /// indexes come back wired to their existing on-disk pages.
    pub fn load(bpm: ArcBufferPool) -> Result<Self> {
        let mut catalog = Self::new(bpm.clone());

        let page = bpm.lock().fetch_page(CATALOG_PAGE_ID)?;
        page.latch().rlock();
        let encoded = {
            let data = unsafe { page.data() };
            let len = u64::from_le_bytes(data[..8].try_into().unwrap()) as usize;
            if len == 0 || len + 8 > PAGE_SIZE {
                None
            } else {
                Some(data[8..8 + len].to_vec())
            }
        };
        page.latch().runlock();
        bpm.lock().unpin_page(&CATALOG_PAGE_ID, false)?;

        let Some(encoded) = encoded else {
            return Ok(catalog);
        };
        let snapshot: CatalogSnapshot = bincode::deserialize(&encoded)?;

        catalog.next_table_oid = snapshot.next_table_oid;
        catalog.next_index_oid = snapshot.next_index_oid;

        for record in snapshot.tables {
            let heap = TableHeap::fetch(bpm.clone(), record.first_page, record.last_page);
            let info = Arc::new(TableInfo {
                oid: record.oid,
                name: record.name.clone(),
                schema: record.schema,
                heap,
            });
            catalog.tables.insert(record.oid, info);
            catalog.table_names.insert(record.name.clone(), record.oid);
            catalog.table_indexes.entry(record.name).or_default();
        }

        for record in snapshot.indexes {
            let table = catalog
                .get_table(&record.table_name)
                .ok_or(anyhow!(Error::TableNotFound(record.table_name.clone())))?;
            let index = TableIndex::fetch(
                record.name.clone(),
                bpm.clone(),
                record.header_page_id,
                HASH_DIRECTORY_MAX_DEPTH,
                HASH_BUCKET_SLOTS,
                HashFunction::default(),
            );
            let info = Arc::new(IndexInfo {
                oid: record.oid,
                name: record.name.clone(),
                table_name: record.table_name.clone(),
                key_schema: table.schema.copy_schema(&record.key_attrs),
                key_attrs: record.key_attrs,
                is_primary_key: record.is_primary_key,
                index,
            });
            catalog.indexes.insert(record.oid, info);
            catalog.index_names.insert(record.name.clone(), record.oid);
            catalog
                .table_indexes
                .entry(record.table_name)
                .or_default()
                .push(record.oid);
        }

        Ok(catalog)
    }
}
