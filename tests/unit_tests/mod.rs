mod dependency;
mod format;
mod remove_unused;
