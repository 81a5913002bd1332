pub const SYSTEM_BASE_MD: &str = include_str!("../prompts/system_base.md");
pub const CONCEPTS_SYSTEM_MD: &str = include_str!("../prompts/concepts_system.md");
pub const CONCEPTS_USER_MD: &str = include_str!("../prompts/concepts_user.md");
pub const ELABORATIONS_SYSTEM_MD: &str = include_str!("../prompts/elaborations_system.md");
pub const ELABORATIONS_USER_MD: &str = include_str!("../prompts/elaborations_user.md");
pub const TAXONOMY_SYSTEM_MD: &str = include_str!("../prompts/taxonomy_system.md");
pub const TAXONOMY_USER_MD: &str = include_str!("../prompts/taxonomy_user.md");
pub const COMPRESSION_SYSTEM_MD: &str = include_str!("../prompts/compression_system.md");
pub const COMPRESSION_USER_MD: &str = include_str!("../prompts/compression_user.md");
pub const META_SYSTEM_MD: &str = include_str!("../prompts/meta_system.md");
pub const META_USER_MD: &str = include_str!("../prompts/meta_user.md");
