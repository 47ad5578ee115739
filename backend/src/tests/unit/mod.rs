mod catalog;
mod scheduler;
