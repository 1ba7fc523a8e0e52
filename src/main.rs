fn main() {
    nmr_pipeline::cli::run();
}
