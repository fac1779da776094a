pub mod helpers;

mod tests_save_search;
