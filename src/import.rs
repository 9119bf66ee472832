//! Fetch, convert and merge, one component at a time or in batches.
//!
//! Everything up to the final merge happens without library locks. The merge
//! itself is synchronous and all-or-nothing; see [`LibraryManager::install`].

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::CacheStore;
use crate::cancel::CancelToken;
use crate::converter::{component_name, Converter};
use crate::easyeda::api::{normalize_lcsc_id, ComponentSource};
use crate::easyeda::models::{ComponentData, Model3dInfo, Part, PartSelection};
use crate::error::{AppError, CacheError, EasyedaError, Result};
use crate::kicad::lib_table::nickname;
use crate::kicad::ModelExporter;
use crate::library::{sanitize_category, Artifacts, LibraryManager, MergeOutcome, ModelTransform};

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub lcsc_id: String,
    pub category: String,
    pub parts: PartSelection,
    /// Import whatever is present instead of failing on missing parts.
    pub allow_partial: bool,
    /// Bypass the cache and fetch again.
    pub refresh: bool,
    /// Placement to store as the component's override.
    pub transform: Option<ModelTransform>,
}

impl ImportRequest {
    pub fn new(lcsc_id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            lcsc_id: lcsc_id.into(),
            category: category.into(),
            parts: PartSelection::ALL,
            allow_partial: false,
            refresh: false,
            transform: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub lcsc_id: String,
    pub name: String,
    pub category: String,
    pub outcome: MergeOutcome,
    pub symbol: Option<MergeOutcome>,
    pub footprint: Option<MergeOutcome>,
    pub models: Vec<MergeOutcome>,
    /// Requested parts the catalog could not provide.
    pub missing: Vec<&'static str>,
    pub from_cache: bool,
}

pub struct Importer<S> {
    source: Arc<S>,
    cache: Arc<CacheStore>,
    library: Arc<LibraryManager>,
    converter: Converter,
    models: ModelExporter,
}

impl<S> Clone for Importer<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            cache: self.cache.clone(),
            library: self.library.clone(),
            converter: Converter::new(),
            models: ModelExporter::new(),
        }
    }
}

impl<S: ComponentSource + 'static> Importer<S> {
    pub fn new(source: Arc<S>, cache: Arc<CacheStore>, library: Arc<LibraryManager>) -> Self {
        Self { source, cache, library, converter: Converter::new(), models: ModelExporter::new() }
    }

    pub fn library(&self) -> &Arc<LibraryManager> {
        &self.library
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Runs a SQLite cache call on the blocking thread pool.
    async fn with_cache<T, F>(&self, call: F) -> Result<T>
    where
        F: FnOnce(&CacheStore) -> std::result::Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        match tokio::task::spawn_blocking(move || call(&cache)).await {
            Ok(result) => Ok(result?),
            Err(e) => Err(AppError::Other(format!("Cache task failed: {}", e))),
        }
    }

    /// Component data from the cache, or fetched and cached. The flag tells
    /// whether it came from the cache.
    pub async fn component(&self, lcsc_id: &str, refresh: bool, cancel: &CancelToken) -> Result<(ComponentData, bool)> {
        let lcsc_id = normalize_lcsc_id(lcsc_id)?;
        cancel.check()?;

        let id = lcsc_id.clone();
        if refresh {
            self.with_cache(move |cache| cache.delete(&id)).await?;
        } else if let Some(component) = self.with_cache(move |cache| cache.get(&id)).await? {
            log::info!("Using cached data for {}", lcsc_id);
            return Ok((component, true));
        }

        let component = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            fetched = self.source.fetch(&lcsc_id) => fetched?,
        };
        let cached = component.clone();
        self.with_cache(move |cache| cache.put(&cached)).await?;
        log::info!("Fetched component: {}", component.title);
        Ok((component, false))
    }

    /// Library-ready model files: STEP as-is, OBJ converted to VRML.
    async fn model_files(
        &self,
        lcsc_id: &str,
        info: &Model3dInfo,
        cancel: &CancelToken,
    ) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let id = lcsc_id.to_string();
        let data = match self.with_cache(move |cache| cache.model(&id)).await? {
            Some(data) => data,
            None => {
                let data = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    fetched = self.source.fetch_model(&info.uuid) => fetched?,
                };
                if data.is_empty() {
                    data
                } else {
                    let id = lcsc_id.to_string();
                    self.with_cache(move |cache| cache.save_model(&id, &data).map(|()| data)).await?
                }
            }
        };

        let mut files = Vec::new();
        if let Some(step) = &data.step {
            match self.models.export_step(step) {
                Ok(bytes) => files.push(("step", bytes)),
                Err(e) => log::warn!("Skipping STEP model for {}: {}", lcsc_id, e),
            }
        }
        if let Some(obj) = &data.obj {
            match self.models.obj_to_wrl(obj) {
                Ok(wrl) => files.push(("wrl", wrl.into_bytes())),
                Err(e) => log::warn!("Skipping OBJ model for {}: {}", lcsc_id, e),
            }
        }
        Ok(files)
    }

    pub async fn import(&self, request: &ImportRequest, cancel: &CancelToken) -> Result<ImportReport> {
        if request.parts.is_empty() {
            return Err(AppError::Other("Nothing selected to import".to_string()));
        }

        let (component, from_cache) = self.component(&request.lcsc_id, request.refresh, cancel).await?;
        let lcsc_id = component.lcsc_id.clone();
        let mut missing = component.missing(request.parts);
        if !request.allow_partial {
            component.require(request.parts)?;
        }

        let category = sanitize_category(&request.category);
        let name = component_name(&component);

        let mut model_files = Vec::new();
        if request.parts.model_3d {
            if let Part::Present(info) = &component.model_3d {
                model_files = self.model_files(&lcsc_id, info, cancel).await?;
                if model_files.is_empty() {
                    if !request.allow_partial {
                        return Err(EasyedaError::PartialData { id: lcsc_id, missing: vec!["3D model"] }.into());
                    }
                    missing.push("3D model");
                }
            }
        }
        cancel.check()?;

        // The footprint points at the STEP file when there is one.
        let model_extension = ["step", "wrl"].into_iter().find(|ext| {
            model_files.iter().any(|(e, _)| e == ext)
                || (component.model_3d.is_present() && self.library.store().model_path(&lcsc_id, ext).exists())
        });

        let footprint = match (&component.footprint, request.parts.footprint) {
            (Part::Present(data), true) => {
                let mut footprint = self.converter.convert_footprint(data, &name)?;
                if let Some(extension) = model_extension {
                    footprint.model_3d = Some(self.library.model_reference(&lcsc_id, &footprint, extension, request.transform)?);
                }
                Some(footprint)
            }
            _ => None,
        };

        let symbol = match (&component.symbol, request.parts.symbol) {
            (Part::Present(data), true) => {
                let has_footprint = footprint.is_some()
                    || (component.footprint.is_present()
                        && self.library.store().footprint_path(&category, &name).exists());
                let footprint_ref = if has_footprint { format!("{}:{}", nickname(&category), name) } else { String::new() };
                Some(self.converter.convert_symbol(&component, data, &name, &footprint_ref, &category)?)
            }
            _ => None,
        };

        if symbol.is_none() && footprint.is_none() && model_files.is_empty() {
            return Err(EasyedaError::PartialData { id: lcsc_id, missing }.into());
        }

        let artifacts = Artifacts {
            lcsc_id: lcsc_id.clone(),
            category,
            name: name.clone(),
            title: component.title.clone(),
            manufacturer: component.manufacturer.clone(),
            symbol,
            footprint,
            models: model_files,
            transform: request.transform,
        };
        cancel.check()?;
        let installed = self.library.install(&artifacts, cancel)?;

        Ok(ImportReport {
            lcsc_id,
            name,
            category: installed.category,
            outcome: installed.outcome,
            symbol: installed.symbol,
            footprint: installed.footprint,
            models: installed.models,
            missing,
            from_cache,
        })
    }

    /// Runs imports on up to `parallel` tasks. Results come back in request
    /// order. Unless `continue_on_error` is set, the first failure cancels
    /// the rest.
    pub async fn import_batch(
        &self,
        requests: Vec<ImportRequest>,
        parallel: usize,
        continue_on_error: bool,
        cancel: &CancelToken,
    ) -> Vec<(String, Result<ImportReport>)> {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
        let mut join_set = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let importer = self.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        log::info!("[{}/{}] Processing: {}", index + 1, total, request.lcsc_id);
                        importer.import(&request, &cancel).await
                    }
                    Err(_) => Err(AppError::Cancelled),
                };
                if result.is_err() && !continue_on_error {
                    cancel.cancel();
                }
                (index, request.lcsc_id, result)
            });
        }

        let mut results: Vec<Option<(String, Result<ImportReport>)>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, id, result)) => results[index] = Some((id, result)),
                Err(e) => log::error!("Import task panicked: {}", e),
            }
        }
        results.into_iter().flatten().collect()
    }
}
