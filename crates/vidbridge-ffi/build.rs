fn main() {
    uniffi::generate_scaffolding("src/vidbridge.udl").expect("failed to generate UniFFI scaffolding");
}
