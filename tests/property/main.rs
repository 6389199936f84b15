// Property tests for assetdag, compiled as one test binary.
