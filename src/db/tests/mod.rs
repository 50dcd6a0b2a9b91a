mod schedules;
mod settings;
