pub mod env;

#[cfg(test)]
pub(crate) mod stub_env;
