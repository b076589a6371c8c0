use crate::db::CatalogEntry;
use crate::types::SourceKind;


/// Minimal GitHub-backed catalog entry for store tests
pub(super) fn sample_entry(name: &str, platform: &str, arch: &str) -> CatalogEntry {
    CatalogEntry {
        name: name.to_string(),
        category: "Tools".to_string(),
        image: String::new(),
        website: SourceKind::Github,
        project_name: format!("owner/{}", name),
        homepage: format!("https://github.com/owner/{}", name),
        url_template: "~/${tag}/${system}-${arch}${suffix_name}".to_string(),
        platform: platform.to_string(),
        arch: arch.to_string(),
        original_platform: platform.to_string(),
        original_arch: arch.to_string(),
        suffix: ".zip".to_string(),
        stale_duration_days: Some(1),
        single_variant: false,
        download_path: format!("/download/?name={}&platform={}&arch={}", name, platform, arch),
    }
}
